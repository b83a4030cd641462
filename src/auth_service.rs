use crate::model::Method;

pub trait AuthService: Send {
    /// decide auth method from candidates
    ///
    /// # Details
    /// returns `None` means that no acceptable methods.
    fn select(&self, candidates: &[Method]) -> Option<Method>;

    /// enumerate supported auth method
    fn supported(&self) -> &[Method];
}

/// Accepts clients offering `NO AUTHENTICATION REQUIRED` and nobody else.
#[derive(Debug, Clone)]
pub struct NoAuthService {
    no_auth: Method,
}

impl NoAuthService {
    pub fn new() -> Self {
        Self {
            no_auth: Method::NoAuth,
        }
    }
}

impl Default for NoAuthService {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthService for NoAuthService {
    fn select(&self, candidates: &[Method]) -> Option<Method> {
        if candidates.contains(&self.no_auth) {
            Some(self.no_auth)
        } else {
            None
        }
    }

    fn supported(&self) -> &[Method] {
        std::slice::from_ref(&self.no_auth)
    }
}
