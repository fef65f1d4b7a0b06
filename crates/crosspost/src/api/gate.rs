use axum::http::HeaderMap;

pub const WORKER_KEY_HEADER: &str = "x-worker-key";

/// Shared-secret check in front of the trigger endpoint.
///
/// With no secret configured every request is refused.
#[derive(Clone, Debug)]
pub struct SharedSecretGate {
    secret: Option<String>,
}

impl SharedSecretGate {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn allows(&self, presented: Option<&str>) -> bool {
        match (self.secret.as_deref(), presented) {
            (Some(secret), Some(presented)) => secret == presented,
            _ => false,
        }
    }

    /// The `key` query parameter takes precedence over the header.
    pub fn check(&self, query_key: Option<&str>, headers: &HeaderMap) -> bool {
        let presented = query_key.or_else(|| {
            headers
                .get(WORKER_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
        });
        self.allows(presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn exact_match_only() {
        let gate = SharedSecretGate::new(Some("s3cret".into()));
        assert!(gate.allows(Some("s3cret")));
        assert!(!gate.allows(Some("s3cret ")));
        assert!(!gate.allows(Some("S3CRET")));
        assert!(!gate.allows(None));
    }

    #[test]
    fn unconfigured_secret_refuses_everything() {
        let gate = SharedSecretGate::new(None);
        assert!(!gate.allows(Some("")));
        assert!(!gate.allows(Some("anything")));

        let empty = SharedSecretGate::new(Some(String::new()));
        assert!(!empty.allows(Some("")));
    }

    #[test]
    fn header_is_accepted_when_query_is_absent() {
        let gate = SharedSecretGate::new(Some("k".into()));
        let mut headers = HeaderMap::new();
        headers.insert(WORKER_KEY_HEADER, HeaderValue::from_static("k"));

        assert!(gate.check(None, &headers));
        assert!(!gate.check(Some("wrong"), &headers));
        assert!(!gate.check(None, &HeaderMap::new()));
    }
}
