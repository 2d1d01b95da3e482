//! Structural filters applied ahead of policy checks.

use std::sync::Arc;

use chainwire_core::{envelope_as_signed_data, verify_signed_data, Envelope, FatalError};
use tracing::error;

use crate::error::{Result, RuleError};
use crate::resources::Resources;
use crate::rule::Rule;

/// Rejects envelopes with no payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRejectRule;

impl Rule for EmptyRejectRule {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn apply(&self, envelope: &Envelope) -> Result<()> {
        if envelope.payload.is_empty() {
            return Err(RuleError::EmptyMessage);
        }
        Ok(())
    }
}

/// Rejects envelopes whose payload exceeds the channel's absolute max bytes.
pub struct SizeFilter {
    resources: Arc<dyn Resources>,
}

impl SizeFilter {
    pub fn new(resources: Arc<dyn Resources>) -> Self {
        Self { resources }
    }
}

impl Rule for SizeFilter {
    fn name(&self) -> &'static str {
        "size"
    }

    fn apply(&self, envelope: &Envelope) -> Result<()> {
        let Some(orderer) = self.resources.orderer_config() else {
            error!("programming error: orderer config not found");
            return Err(FatalError::MissingOrdererConfig.into());
        };

        let max = orderer.absolute_max_bytes();
        let size = envelope.payload.len();
        if size > max as usize {
            return Err(RuleError::MessageTooLarge { size, max });
        }
        Ok(())
    }
}

/// Verifies the envelope signature against its creator's public key.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureRule;

impl Rule for SignatureRule {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn apply(&self, envelope: &Envelope) -> Result<()> {
        let signed = envelope_as_signed_data(envelope).map_err(RuleError::CannotExtractSignedData)?;
        for data in &signed {
            verify_signed_data(data).map_err(RuleError::InvalidSignature)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ChannelResources, OrdererConfig, OrdererSettings};
    use chainwire_core::{
        create_signed_envelope, CoreError, HeaderType, Keypair, LocalSigner, Payload, Signer,
    };

    fn max_bytes(absolute_max_bytes: u32) -> Arc<dyn Resources> {
        let settings = OrdererSettings {
            absolute_max_bytes,
            ..Default::default()
        };
        Arc::new(ChannelResources::new(Some(
            Arc::new(settings) as Arc<dyn OrdererConfig>
        )))
    }

    fn signed(data: &[u8]) -> Envelope {
        let signer = LocalSigner::new("Org1MSP", Keypair::from_seed(&[4; 32]));
        let payload = Payload {
            header: None,
            data: data.to_vec(),
        };
        create_signed_envelope(
            HeaderType::Message,
            "mychannel",
            Some(&signer as &dyn Signer),
            &payload,
            0,
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_reject() {
        assert_eq!(
            EmptyRejectRule.apply(&Envelope::default()),
            Err(RuleError::EmptyMessage)
        );
        assert_eq!(EmptyRejectRule.apply(&signed(b"hello")), Ok(()));
    }

    #[test]
    fn test_size_filter_boundary() {
        let env = signed(&[7; 64]);
        let size = env.payload.len();

        assert_eq!(SizeFilter::new(max_bytes(size as u32)).apply(&env), Ok(()));
        assert_eq!(
            SizeFilter::new(max_bytes(size as u32 - 1)).apply(&env),
            Err(RuleError::MessageTooLarge {
                size,
                max: size as u32 - 1
            })
        );
    }

    #[test]
    fn test_size_filter_missing_config_is_fatal() {
        let filter = SizeFilter::new(Arc::new(ChannelResources::default()));
        assert!(filter.apply(&signed(b"x")).unwrap_err().is_fatal());
    }

    #[test]
    fn test_signature_rule() {
        let env = signed(b"payload");
        assert_eq!(SignatureRule.apply(&env), Ok(()));

        let mut tampered = env.clone();
        tampered.signature[0] ^= 0x01;
        assert!(matches!(
            SignatureRule.apply(&tampered),
            Err(RuleError::InvalidSignature(CoreError::InvalidSignature))
        ));

        assert!(matches!(
            SignatureRule.apply(&Envelope::default()),
            Err(RuleError::CannotExtractSignedData(CoreError::MissingHeader))
        ));
    }
}
