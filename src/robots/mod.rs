//! Robots.txt handling module
//!
//! The seed origin's robots.txt is fetched once per run and consulted for
//! every candidate URL. Any failure to obtain it means "allow all".

mod parser;

pub use parser::{RobotsRules, WILDCARD_AGENT};

use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

/// Location of robots.txt for the origin of `url`
pub fn robots_url(url: &Url) -> Url {
    let mut robots = crate::url::origin_root(url);
    robots.set_path("/robots.txt");
    robots
}

/// Fetches and parses robots.txt for the origin of `origin`
///
/// Never fails: network errors, non-2xx responses and unreadable bodies all
/// produce [`RobotsRules::allow_all`].
pub async fn fetch_robots(client: &Client, origin: &Url) -> RobotsRules {
    let robots_url = robots_url(origin);
    debug!("Fetching robots.txt: {}", robots_url);

    let response = match client.get(robots_url.as_str()).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(
                "Could not fetch {} ({}), allowing all URLs",
                robots_url, e
            );
            return RobotsRules::allow_all();
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!(
            "No robots.txt at {} (HTTP {}), allowing all URLs",
            robots_url,
            status.as_u16()
        );
        return RobotsRules::allow_all();
    }

    match response.text().await {
        Ok(body) => {
            info!("Loaded robots.txt from {} ({} bytes)", robots_url, body.len());
            RobotsRules::from_content(&body)
        }
        Err(e) => {
            warn!(
                "Could not read {} ({}), allowing all URLs",
                robots_url, e
            );
            RobotsRules::allow_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_robots_url() {
        let url = Url::parse("https://example.test:8443/pages/a.html?x=1").unwrap();
        assert_eq!(
            robots_url(&url).as_str(),
            "https://example.test:8443/robots.txt"
        );
    }

    /// Collects formatted log output for assertions
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all_with_warning() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let origin = Url::parse(&server.uri()).unwrap();
        let rules = fetch_robots(&Client::new(), &origin).await;

        assert!(rules.is_permissive());
        assert!(rules.allows(&format!("{}/private/x", server.uri())));

        let output = logs.contents();
        assert!(output.contains("WARN"), "log output: {}", output);
        assert!(output.contains("No robots.txt"), "log output: {}", output);
        assert!(output.contains("HTTP 404"), "log output: {}", output);
    }
}
