//! Rejects envelopes whose creator identity has expired.

use std::sync::Arc;
use std::time::SystemTime;

use chainwire_core::{envelope_as_signed_data, Envelope, FatalError, IdentityExpiry};
use tracing::error;

use crate::error::{Result, RuleError};
use crate::resources::Resources;
use crate::rule::Rule;

/// Rejects messages signed by expired identities once the channel's
/// orderer capabilities turn the check on.
pub struct ExpirationRejectRule {
    resources: Arc<dyn Resources>,
    expiry: Arc<dyn IdentityExpiry>,
}

impl ExpirationRejectRule {
    pub fn new(resources: Arc<dyn Resources>, expiry: Arc<dyn IdentityExpiry>) -> Self {
        Self { resources, expiry }
    }
}

impl Rule for ExpirationRejectRule {
    fn name(&self) -> &'static str {
        "expiration"
    }

    fn apply(&self, envelope: &Envelope) -> Result<()> {
        let Some(orderer) = self.resources.orderer_config() else {
            error!("programming error: orderer config not found");
            return Err(FatalError::MissingOrdererConfig.into());
        };
        if !orderer.capabilities().expiration_check() {
            return Ok(());
        }

        let signed = envelope_as_signed_data(envelope).map_err(RuleError::CannotExtractSignedData)?;
        let Some(creator) = signed.first() else {
            return Ok(());
        };

        match self.expiry.expires_at(&creator.identity) {
            Some(expires_at) if SystemTime::now() >= expires_at => Err(RuleError::IdentityExpired),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{CapabilityFlags, ChannelResources, OrdererConfig, OrdererSettings};
    use chainwire_core::{
        create_signed_envelope, CoreError, HeaderType, Keypair, LocalSigner, Payload,
        SerializedIdentityExpiry, Signer,
    };
    use std::time::Duration;

    struct FixedExpiry(Option<SystemTime>);

    impl IdentityExpiry for FixedExpiry {
        fn expires_at(&self, _identity: &[u8]) -> Option<SystemTime> {
            self.0
        }
    }

    fn resources(expiration_check: bool) -> Arc<dyn Resources> {
        let settings = OrdererSettings {
            capabilities: CapabilityFlags { expiration_check },
            ..Default::default()
        };
        Arc::new(ChannelResources::new(Some(
            Arc::new(settings) as Arc<dyn OrdererConfig>
        )))
    }

    fn envelope(signer: &LocalSigner) -> Envelope {
        create_signed_envelope(
            HeaderType::Message,
            "mychannel",
            Some(signer as &dyn Signer),
            &Payload::default(),
            0,
            0,
        )
        .unwrap()
    }

    fn signer() -> LocalSigner {
        LocalSigner::new("Org1MSP", Keypair::from_seed(&[9; 32]))
    }

    #[test]
    fn test_non_expiring_identity_accepted() {
        let rule = ExpirationRejectRule::new(resources(true), Arc::new(FixedExpiry(None)));
        assert_eq!(rule.apply(&envelope(&signer())), Ok(()));
    }

    #[test]
    fn test_future_expiry_accepted() {
        let later = SystemTime::now() + Duration::from_secs(3600);
        let rule = ExpirationRejectRule::new(resources(true), Arc::new(FixedExpiry(Some(later))));
        assert_eq!(rule.apply(&envelope(&signer())), Ok(()));
    }

    #[test]
    fn test_expired_identity_rejected() {
        let earlier = SystemTime::now() - Duration::from_secs(3600);
        let rule = ExpirationRejectRule::new(resources(true), Arc::new(FixedExpiry(Some(earlier))));
        assert_eq!(
            rule.apply(&envelope(&signer())),
            Err(RuleError::IdentityExpired)
        );
    }

    #[test]
    fn test_check_disabled_by_capability() {
        let earlier = SystemTime::now() - Duration::from_secs(3600);
        let rule = ExpirationRejectRule::new(resources(false), Arc::new(FixedExpiry(Some(earlier))));
        assert_eq!(rule.apply(&envelope(&signer())), Ok(()));
        // Not even parsed when the check is off.
        assert_eq!(rule.apply(&Envelope::default()), Ok(()));
    }

    #[test]
    fn test_missing_orderer_config_is_fatal() {
        let rule = ExpirationRejectRule::new(
            Arc::new(ChannelResources::default()),
            Arc::new(FixedExpiry(None)),
        );
        let err = rule.apply(&envelope(&signer())).unwrap_err();
        assert_eq!(err, RuleError::Fatal(FatalError::MissingOrdererConfig));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unparseable_envelope_rejected() {
        let rule = ExpirationRejectRule::new(resources(true), Arc::new(FixedExpiry(None)));
        let bad = Envelope {
            payload: vec![0xff],
            signature: Vec::new(),
        };
        assert!(matches!(
            rule.apply(&bad),
            Err(RuleError::CannotExtractSignedData(CoreError::MalformedMessage { .. }))
        ));
    }

    #[test]
    fn test_reads_expiry_from_serialized_identity() {
        let rule = ExpirationRejectRule::new(resources(true), Arc::new(SerializedIdentityExpiry));
        let expired = signer().with_expiry(1_000_000_000);
        assert_eq!(
            rule.apply(&envelope(&expired)),
            Err(RuleError::IdentityExpired)
        );
        assert_eq!(rule.apply(&envelope(&signer())), Ok(()));
    }
}
