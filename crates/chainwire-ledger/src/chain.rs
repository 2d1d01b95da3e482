//! Append-order validation shared by every ledger backend.

use chainwire_core::{block_header_hash, Block};

use crate::error::{LedgerError, Result};

/// The end of a channel's chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Tip {
    /// Number the next block must carry.
    pub height: u64,
    /// Header hash of the last block, `None` before genesis.
    pub hash: Option<Vec<u8>>,
}

impl Tip {
    /// Check that `block` extends this tip and return the tip after it.
    pub fn extend(&self, block: &Block) -> Result<Tip> {
        let header = block.header.as_ref().ok_or(LedgerError::MissingHeader)?;

        if header.number != self.height {
            return Err(LedgerError::InvalidBlockNumber {
                expected: self.height,
                got: header.number,
            });
        }

        if let Some(hash) = &self.hash {
            if header.previous_hash != *hash {
                return Err(LedgerError::PreviousHashMismatch {
                    number: header.number,
                });
            }
        }

        Ok(Tip {
            height: self.height + 1,
            hash: Some(block_header_hash(header)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainwire_core::new_block;

    #[test]
    fn test_extend_from_empty() {
        let tip = Tip::default().extend(&new_block(0, &[])).unwrap();
        assert_eq!(tip.height, 1);
        assert!(tip.hash.is_some());
    }

    #[test]
    fn test_extend_checks_number() {
        let err = Tip::default().extend(&new_block(1, &[])).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidBlockNumber { expected: 0, got: 1 }
        ));
    }

    #[test]
    fn test_extend_checks_previous_hash() {
        let genesis = new_block(0, &[]);
        let tip = Tip::default().extend(&genesis).unwrap();

        let good = new_block(1, &block_header_hash(genesis.header.as_ref().unwrap()));
        assert!(tip.extend(&good).is_ok());

        let bad = new_block(1, b"elsewhere");
        assert!(matches!(
            tip.extend(&bad),
            Err(LedgerError::PreviousHashMismatch { number: 1 })
        ));
    }

    #[test]
    fn test_extend_requires_header() {
        assert!(matches!(
            Tip::default().extend(&Block::default()),
            Err(LedgerError::MissingHeader)
        ));
    }
}
