//! Player id verification against the provider, driven by per-game configs.

use crate::entities::verification_configs::VerificationConfig;
use crate::provider::{FulfillmentProvider, PlayerCheckRequest, ProviderError};
use crate::repository::Repository;
use crate::utils::ttl_cache::{Clock, SystemClock, TtlCache};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Game not supported for verification")]
    UnknownGame,

    #[error("Server ID is required for this game")]
    ZoneRequired,

    #[error("Player ID is required")]
    MissingPlayerId,

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerVerification {
    pub valid: bool,
    pub player_name: Option<String>,
    pub message: String,
}

/// Checks player ids, caching found verification configs for the configured
/// TTL. Misses are not cached, so arbitrary game names cannot grow the cache.
pub struct PlayerVerifier<C: Clock = SystemClock> {
    repo: Arc<dyn Repository>,
    provider: Arc<dyn FulfillmentProvider>,
    configs: TtlCache<String, VerificationConfig, C>,
}

impl PlayerVerifier<SystemClock> {
    pub fn new(
        repo: Arc<dyn Repository>,
        provider: Arc<dyn FulfillmentProvider>,
        ttl: Duration,
    ) -> Self {
        Self::with_clock(repo, provider, ttl, SystemClock)
    }
}

impl<C: Clock> PlayerVerifier<C> {
    pub fn with_clock(
        repo: Arc<dyn Repository>,
        provider: Arc<dyn FulfillmentProvider>,
        ttl: Duration,
        clock: C,
    ) -> Self {
        Self {
            repo,
            provider,
            configs: TtlCache::with_clock(ttl, clock),
        }
    }

    async fn config_for(&self, game_name: &str) -> Result<Option<VerificationConfig>, sqlx::Error> {
        let key = game_name.trim().to_lowercase();
        if let Some(cached) = self.configs.get(&key) {
            return Ok(Some(cached));
        }
        let config = self.repo.get_verification_config(&key).await?;
        if let Some(config) = &config {
            self.configs.insert(key, config.clone());
        }
        Ok(config)
    }

    pub async fn verify(
        &self,
        game_name: &str,
        player_id: &str,
        server_id: Option<&str>,
    ) -> Result<PlayerVerification, VerificationError> {
        let player_id = player_id.trim();
        if player_id.is_empty() {
            return Err(VerificationError::MissingPlayerId);
        }
        let config = self
            .config_for(game_name)
            .await?
            .filter(|c| c.enabled && !c.provider_game_codes.is_empty())
            .ok_or(VerificationError::UnknownGame)?;

        let zone = server_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| config.default_zone.clone());
        if config.requires_zone && zone.is_none() {
            return Err(VerificationError::ZoneRequired);
        }

        let mut rejection = None;
        let mut last_error = None;
        for game_code in &config.provider_game_codes {
            let request = PlayerCheckRequest {
                game_code: game_code.clone(),
                player_id: player_id.to_string(),
                server_id: zone.clone(),
            };
            match self.provider.check_player(&request).await {
                Ok(check) if check.valid => {
                    debug!(game_code = %game_code, "Player verified");
                    return Ok(PlayerVerification {
                        valid: true,
                        player_name: check.player_name,
                        message: check
                            .message
                            .unwrap_or_else(|| "Player verified".to_string()),
                    });
                }
                Ok(check) => rejection = Some(check.message),
                Err(e) => {
                    warn!(game_code = %game_code, error = %e, "Player check failed");
                    last_error = Some(e);
                }
            }
        }

        match (rejection, last_error) {
            (Some(message), _) => Ok(PlayerVerification {
                valid: false,
                player_name: None,
                message: message.unwrap_or_else(|| "Player not found".to_string()),
            }),
            (None, Some(e)) => Err(e.into()),
            (None, None) => Err(VerificationError::UnknownGame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::PlayerCheck;
    use crate::testing::{InMemoryRepository, ScriptedProvider};
    use crate::utils::ttl_cache::ManualClock;

    fn mlbb() -> VerificationConfig {
        VerificationConfig {
            game_name: "mobile legends".to_string(),
            provider_game_codes: vec!["mlbb".to_string(), "mlbb_ph".to_string()],
            requires_zone: true,
            default_zone: None,
            enabled: true,
        }
    }

    fn valid(name: &str) -> PlayerCheck {
        PlayerCheck {
            valid: true,
            player_name: Some(name.to_string()),
            message: None,
        }
    }

    fn setup() -> (
        Arc<InMemoryRepository>,
        Arc<ScriptedProvider>,
        ManualClock,
        PlayerVerifier<ManualClock>,
    ) {
        let repo = Arc::new(InMemoryRepository::new());
        let provider = Arc::new(ScriptedProvider::new());
        let clock = ManualClock::new();
        let verifier = PlayerVerifier::with_clock(
            repo.clone(),
            provider.clone(),
            Duration::from_secs(300),
            clock.clone(),
        );
        (repo, provider, clock, verifier)
    }

    #[tokio::test]
    async fn test_falls_through_game_codes() {
        let (repo, provider, _clock, verifier) = setup();
        repo.add_verification_config(mlbb());
        provider.on_check_player("mlbb_ph", valid("Tester"));

        let result = verifier
            .verify("Mobile Legends", "123456", Some("2001"))
            .await
            .unwrap();
        assert!(result.valid);
        assert_eq!(result.player_name.as_deref(), Some("Tester"));
        assert_eq!(provider.player_checks(), vec!["mlbb", "mlbb_ph"]);
    }

    #[tokio::test]
    async fn test_zone_rules() {
        let (repo, provider, _clock, verifier) = setup();
        repo.add_verification_config(mlbb());
        assert!(matches!(
            verifier.verify("mobile legends", "1", None).await,
            Err(VerificationError::ZoneRequired)
        ));

        let mut with_default = mlbb();
        with_default.game_name = "ml default".to_string();
        with_default.default_zone = Some("1001".to_string());
        repo.add_verification_config(with_default);
        provider.on_check_player("mlbb", valid("Z"));
        assert!(verifier.verify("ml default", "1", None).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_games() {
        let (repo, _provider, _clock, verifier) = setup();
        let mut disabled = mlbb();
        disabled.enabled = false;
        repo.add_verification_config(disabled);

        assert!(matches!(
            verifier.verify("mobile legends", "1", Some("1")).await,
            Err(VerificationError::UnknownGame)
        ));
        assert!(matches!(
            verifier.verify("nope", "1", Some("1")).await,
            Err(VerificationError::UnknownGame)
        ));
    }

    #[tokio::test]
    async fn test_configs_are_cached_until_ttl() {
        let (repo, provider, clock, verifier) = setup();
        provider.on_check_player("mlbb", valid("A"));
        repo.add_verification_config(mlbb());

        assert!(verifier.verify("mobile legends", "1", Some("1")).await.unwrap().valid);
        assert!(verifier.verify("Mobile Legends ", "1", Some("1")).await.unwrap().valid);
        assert_eq!(repo.verification_config_reads(), 1);

        clock.advance(Duration::from_secs(300));
        assert!(verifier.verify("mobile legends", "1", Some("1")).await.unwrap().valid);
        assert_eq!(repo.verification_config_reads(), 2);
    }

    #[tokio::test]
    async fn test_unknown_games_are_not_cached() {
        let (repo, provider, _clock, verifier) = setup();
        provider.on_check_player("mlbb", valid("A"));

        for i in 0..50 {
            let game = format!("no such game {i}");
            assert!(matches!(
                verifier.verify(&game, "1", Some("1")).await,
                Err(VerificationError::UnknownGame)
            ));
        }
        assert_eq!(repo.verification_config_reads(), 50);
        assert!(verifier.configs.is_empty());

        // a config added after a miss is picked up straight away
        assert!(verifier.verify("mobile legends", "1", Some("1")).await.is_err());
        repo.add_verification_config(mlbb());
        assert!(verifier.verify("mobile legends", "1", Some("1")).await.unwrap().valid);
        assert_eq!(verifier.configs.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_player_is_not_an_error() {
        let (repo, provider, _clock, verifier) = setup();
        repo.add_verification_config(mlbb());
        provider.on_check_player(
            "mlbb",
            PlayerCheck {
                valid: false,
                player_name: None,
                message: Some("Invalid user id".to_string()),
            },
        );

        let result = verifier.verify("mobile legends", "1", Some("1")).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.message, "Invalid user id");
    }
}
