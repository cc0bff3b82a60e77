use url::Url;
use uuid::Uuid;

use super::{ClientError, ClientResult};

/// Who is calling and where. Passed explicitly to every client component.
#[derive(Debug, Clone)]
pub struct Session {
    base_url: Url,
    token: Option<String>,
    user_id: Option<Uuid>,
}

impl Session {
    /// `base_url` is the API root, e.g. `https://api.example.com/`
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            token: None,
            user_id: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: Uuid) -> Self {
        self.token = Some(token.into());
        self.user_id = Some(user_id);
        self
    }

    pub fn user_id(&self) -> ClientResult<Uuid> {
        self.user_id.ok_or(ClientError::NotAuthenticated)
    }

    pub fn bearer(&self) -> ClientResult<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(ClientError::NotAuthenticated)
    }

    pub fn endpoint(&self, path: &str) -> ClientResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// `ws(s)://…/ws?token=…`
    pub fn socket_url(&self) -> ClientResult<Url> {
        let token = self.bearer()?;
        let mut url = self.endpoint("ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Validation(format!("Cannot open a socket to {}", self.base_url)))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_resolve_under_base_path() {
        let session = Session::new("http://localhost:8080/api").unwrap();
        assert_eq!(
            session.endpoint("/bids/order/1").unwrap().as_str(),
            "http://localhost:8080/api/bids/order/1"
        );
    }

    #[test]
    fn socket_url_carries_token() {
        let user = Uuid::new_v4();
        let session = Session::new("https://api.example.com/")
            .unwrap()
            .with_token("abc", user);
        assert_eq!(
            session.socket_url().unwrap().as_str(),
            "wss://api.example.com/ws?token=abc"
        );
        assert_eq!(session.user_id().unwrap(), user);
    }

    #[test]
    fn anonymous_session_has_no_bearer() {
        let session = Session::new("http://localhost:8080").unwrap();
        assert!(matches!(session.bearer(), Err(ClientError::NotAuthenticated)));
        assert!(matches!(session.socket_url(), Err(ClientError::NotAuthenticated)));
    }
}
