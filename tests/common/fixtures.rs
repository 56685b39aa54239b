//! Mock image server and config fixtures

use imgdl::{Config, Strategy};
use std::path::PathBuf;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Images served by [`ImageServer`]: route, body
pub const IMAGES: &[(&str, &[u8])] = &[
    ("/images/img1.jpg", b"\xFF\xD8\xFF\xE0 pretend jpeg payload for img1"),
    ("/images/img2.png", b"\x89PNG\r\n\x1a\n pretend png payload, a bit longer than the jpeg"),
];

/// Route that always answers 404
pub const MISSING_ROUTE: &str = "/images/missing.gif";

/// Route that answers slowly with [`SLOW_DELAY`]
pub const SLOW_ROUTE: &str = "/images/slow.jpg";

/// Delay applied to [`SLOW_ROUTE`]
pub const SLOW_DELAY: Duration = Duration::from_millis(300);

/// A wiremock server publishing the fixture images
pub struct ImageServer {
    pub server: MockServer,
}

impl ImageServer {
    /// Start a server with every fixture route mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;

        for (route, body) in IMAGES {
            Mock::given(method("GET"))
                .and(path(*route))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "image/octet-stream")
                        .set_body_bytes(body.to_vec()),
                )
                .mount(&server)
                .await;
        }

        Mock::given(method("GET"))
            .and(path(MISSING_ROUTE))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(SLOW_ROUTE))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow image".to_vec())
                    .set_delay(SLOW_DELAY),
            )
            .mount(&server)
            .await;

        Self { server }
    }

    /// Absolute URL for `route`
    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.server.uri(), route)
    }

    /// URLs of every fixture image
    pub fn image_urls(&self) -> Vec<String> {
        IMAGES.iter().map(|(route, _)| self.url(route)).collect()
    }
}

/// Expected (filename, bytes) pairs for the fixture images
pub fn expected_files() -> Vec<(String, Vec<u8>)> {
    IMAGES
        .iter()
        .map(|(route, body)| {
            let name = route.rsplit('/').next().unwrap_or_default().to_string();
            (name, body.to_vec())
        })
        .collect()
}

/// Config for `strategy` writing into `output_dir`
///
/// Multiprocess workers run the `imgdl` binary built for this test run.
pub fn test_config(strategy: Strategy, output_dir: PathBuf) -> Config {
    Config {
        output_dir,
        strategy,
        workers: Some(2),
        concurrency: 8,
        worker_program: Some(PathBuf::from(env!("CARGO_BIN_EXE_imgdl"))),
        cancel_grace: Duration::from_millis(200),
        unit: imgdl::UnitSettings {
            request_timeout: Duration::from_secs(10),
            ..Default::default()
        },
    }
}
