use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, Uri, header},
    response::Redirect,
    routing::{get, post},
};
use cms_gate::upstream::{HttpUpstream, MAX_FORWARD_BODY, MockUpstream, Upstream};
use tokio::net::TcpListener;

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_path() {
        let mock = MockUpstream::new();
        let request = Request::builder()
            .uri("/posts/all_posts?page=2")
            .body(Body::empty())
            .unwrap();
        let response = mock.forward(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "upstream:/posts/all_posts");
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockUpstream::new_failing();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(mock.forward(request).await.status(), StatusCode::BAD_GATEWAY);
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;

    /// Spawns a stand-in front-end on an ephemeral port and returns its origin.
    async fn spawn_frontend() -> String {
        async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: String) -> String {
            let cookie = headers
                .get(header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            format!("{method} {uri} cookie={cookie} body={body}")
        }

        let frontend = Router::new()
            .route("/posts/all_posts", get(echo))
            .route("/posts/create_post", post(echo))
            .route("/uploads", post(|| async { "accepted" }))
            .route("/moved", get(|| async { Redirect::temporary("/elsewhere") }))
            .route(
                "/teapot",
                get(|| async { (StatusCode::IM_A_TEAPOT, [("x-frontend", "yes")], "short") }),
            );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind port");
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, frontend).await.unwrap();
        });
        format!("http://127.0.0.1:{port}")
    }

    #[tokio::test]
    async fn test_forwards_method_query_headers_and_body() {
        let origin = spawn_frontend().await;
        let upstream = HttpUpstream::new(&format!("{origin}/")).unwrap();
        assert_eq!(upstream.base_url(), origin);

        let response = upstream
            .forward(
                Request::builder()
                    .uri("/posts/all_posts?page=2")
                    .header(header::COOKIE, "accessToken=t")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response).await,
            "GET /posts/all_posts?page=2 cookie=accessToken=t body="
        );

        let response = upstream
            .forward(
                Request::builder()
                    .method(Method::POST)
                    .uri("/posts/create_post")
                    .body(Body::from("title=Hello"))
                    .unwrap(),
            )
            .await;
        assert_eq!(
            body_text(response).await,
            "POST /posts/create_post cookie=- body=title=Hello"
        );
    }

    #[tokio::test]
    async fn test_preserves_status_headers_and_redirects() {
        let origin = spawn_frontend().await;
        let upstream = HttpUpstream::new(&origin).unwrap();

        let response = upstream
            .forward(Request::builder().uri("/teapot").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers().get("x-frontend").unwrap(), "yes");
        assert_eq!(body_text(response).await, "short");

        // Front-end redirects reach the browser instead of being followed.
        let response = upstream
            .forward(Request::builder().uri("/moved").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/elsewhere");
    }

    #[tokio::test]
    async fn test_forwards_normalized_path() {
        let origin = spawn_frontend().await;
        let upstream = HttpUpstream::new(&origin).unwrap();

        for path in ["/x/../posts/all_posts", "/posts/%2e/all_posts/", "/%70osts//all_posts"] {
            let response = upstream
                .forward(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await;
            assert_eq!(response.status(), StatusCode::OK, "{path}");
            assert!(
                body_text(response).await.starts_with("GET /posts/all_posts "),
                "{path}"
            );
        }
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let origin = spawn_frontend().await;
        let upstream = HttpUpstream::new(&origin).unwrap();

        let response = upstream
            .forward(
                Request::builder()
                    .method(Method::POST)
                    .uri("/uploads")
                    .body(Body::from(vec![b'a'; MAX_FORWARD_BODY + 1]))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = upstream
            .forward(
                Request::builder()
                    .method(Method::POST)
                    .uri("/uploads")
                    .body(Body::from(vec![b'a'; 1024]))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "accepted");
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_bad_gateway() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let upstream = HttpUpstream::new(&format!("http://127.0.0.1:{port}")).unwrap();
        let response = upstream
            .forward(Request::builder().uri("/dashboard").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
