use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

pub const SERVER_ID_HEADER: HeaderName = HeaderName::from_static("x-server-id");

/// Tag every response with the instance that produced it, so clients
/// behind a load balancer can see the distribution.
pub async fn stamp_server_id(server_id: HeaderValue, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(SERVER_ID_HEADER, server_id);
    response
}

/// Chrome Private Network Access: a public page fetching a private address
/// sends `Access-Control-Request-Private-Network: true` in the preflight and
/// expects `Access-Control-Allow-Private-Network: true` back.
pub async fn allow_private_network(request: Request, next: Next) -> Response {
    let needs_pna = request
        .headers()
        .get("access-control-request-private-network")
        .is_some();
    let mut response = next.run(request).await;
    if needs_pna {
        response.headers_mut().insert(
            "access-control-allow-private-network",
            HeaderValue::from_static("true"),
        );
    }
    response
}
