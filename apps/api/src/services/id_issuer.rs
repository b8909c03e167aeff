//! Random token issuance for session ids and host secrets

use std::future::Future;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::store::StoreError;

/// Random bytes per token
pub const TOKEN_BYTES: usize = 16;

/// Length of an encoded token (padded base64url of [`TOKEN_BYTES`])
pub const TOKEN_LEN: usize = 24;

/// Errors from unique token issuance
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("no unused token found after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues tokens that are unique against whatever the caller checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdIssuer {
    /// `None` retries until an unused token turns up
    max_attempts: Option<u32>,
}

impl IdIssuer {
    /// `max_attempts` of zero means unbounded
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: (max_attempts > 0).then_some(max_attempts),
        }
    }

    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Fresh random token from the OS RNG
    pub fn new_token() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE.encode(bytes)
    }

    /// Check that a caller-supplied token has the shape this issuer produces
    pub fn is_well_formed(token: &str) -> bool {
        token.len() == TOKEN_LEN
            && URL_SAFE
                .decode(token)
                .is_ok_and(|bytes| bytes.len() == TOKEN_BYTES)
    }

    /// Generate tokens until `taken` reports one unused
    pub async fn issue_unique<F, Fut>(&self, taken: F) -> Result<String, IssueError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<bool, StoreError>>,
    {
        self.issue_unique_with(Self::new_token, taken).await
    }

    async fn issue_unique_with<G, F, Fut>(
        &self,
        mut generate: G,
        mut taken: F,
    ) -> Result<String, IssueError>
    where
        G: FnMut() -> String,
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<bool, StoreError>>,
    {
        let mut attempts = 0u32;
        loop {
            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    return Err(IssueError::Exhausted { attempts });
                }
            }
            attempts += 1;

            let candidate = generate();
            if !taken(candidate.clone()).await? {
                return Ok(candidate);
            }

            tracing::debug!(attempt = attempts, "Generated token collided, retrying");
        }
    }
}

impl Default for IdIssuer {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_shape() {
        for _ in 0..32 {
            let token = IdIssuer::new_token();
            assert_eq!(token.len(), TOKEN_LEN);
            assert!(token.ends_with("=="));
            assert!(!token.contains('+') && !token.contains('/'));
            assert!(IdIssuer::is_well_formed(&token));
        }
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let tokens: HashSet<_> = (0..1_000).map(|_| IdIssuer::new_token()).collect();
        assert_eq!(tokens.len(), 1_000);
    }

    #[test]
    fn test_is_well_formed_rejects_bad_input() {
        assert!(!IdIssuer::is_well_formed(""));
        assert!(!IdIssuer::is_well_formed("short"));
        assert!(!IdIssuer::is_well_formed(&"!".repeat(TOKEN_LEN)));
        assert!(!IdIssuer::is_well_formed(&"A".repeat(TOKEN_LEN + 1)));
    }

    #[tokio::test]
    async fn test_issue_unique_retries_on_collision() {
        let issuer = IdIssuer::new(5);
        let mut queue = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        let taken: HashSet<&str> = ["a", "b"].into_iter().collect();

        let token = issuer
            .issue_unique_with(
                || queue.pop().unwrap(),
                |candidate| {
                    let hit = taken.contains(candidate.as_str());
                    async move { Ok(hit) }
                },
            )
            .await
            .unwrap();

        assert_eq!(token, "c");
    }

    #[tokio::test]
    async fn test_issue_unique_gives_up_when_bounded() {
        let issuer = IdIssuer::new(3);
        let mut calls = 0;

        let result = issuer
            .issue_unique(|_| {
                calls += 1;
                async { Ok(true) }
            })
            .await;

        assert!(matches!(result, Err(IssueError::Exhausted { attempts: 3 })));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_issue_unique_propagates_store_errors() {
        let issuer = IdIssuer::unbounded();
        let result = issuer
            .issue_unique(|candidate| async move { Err(StoreError::WrongType(candidate)) })
            .await;

        assert!(matches!(result, Err(IssueError::Store(_))));
    }

    #[test]
    fn test_zero_means_unbounded() {
        assert_eq!(IdIssuer::new(0).max_attempts(), None);
        assert_eq!(IdIssuer::new(4).max_attempts(), Some(4));
        assert_eq!(IdIssuer::default().max_attempts(), Some(16));
    }
}
