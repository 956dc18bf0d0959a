/// Base URL of the production service
pub const DEFAULT_BASE_URL: &str = "https://zvikoro.onrender.com/schools/";

/// URLs of the endpoints this crate talks to, relative to one base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Resolve a path such as `"secondary-schools/"` against the base
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    // ===== Auth =====

    pub fn token(&self) -> String {
        self.url("token/")
    }

    pub fn token_refresh(&self) -> String {
        self.url("token/refresh/")
    }

    // ===== Accounts =====

    pub fn user_me(&self) -> String {
        self.url("users/me/")
    }

    pub fn register_user(&self) -> String {
        self.url("register/")
    }

    pub fn register_admin(&self) -> String {
        self.url("admins/create/")
    }

    // ===== Payments =====

    pub fn update_balances(&self) -> String {
        self.url("update-balance/")
    }

    // ===== Messages =====

    pub fn messages(&self) -> String {
        self.url("messages/")
    }

    pub fn messages_public(&self) -> String {
        self.url("messages/public/")
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_gets_trailing_slash() {
        let endpoints = Endpoints::new("http://127.0.0.1:8080/schools");
        assert_eq!(endpoints.base(), "http://127.0.0.1:8080/schools/");
        assert_eq!(endpoints.token(), "http://127.0.0.1:8080/schools/token/");
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.url("/secondary-schools/"),
            "https://zvikoro.onrender.com/schools/secondary-schools/"
        );
        assert_eq!(
            endpoints.token_refresh(),
            "https://zvikoro.onrender.com/schools/token/refresh/"
        );
        assert_eq!(
            endpoints.messages_public(),
            "https://zvikoro.onrender.com/schools/messages/public/"
        );
    }
}
