use crate::model::{GroupId, RunId, Transfer};
use sha2::{Digest, Sha256};
use std::fmt;

const FINGERPRINT_FORMAT_VERSION: u8 = 1;

/// Idempotency key of a settlement: SHA-256 over
/// `(group_id, run_id, from, to, amount_minor)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettlementFingerprint([u8; 32]);

impl SettlementFingerprint {
    pub fn compute(group_id: GroupId, run_id: RunId, transfer: &Transfer) -> Self {
        let mut framed = [0_u8; 49];
        framed[0] = FINGERPRINT_FORMAT_VERSION;
        framed[1..9].copy_from_slice(&group_id.0.to_be_bytes());
        framed[9..25].copy_from_slice(run_id.0.as_bytes());
        framed[25..33].copy_from_slice(&transfer.from.0.to_be_bytes());
        framed[33..41].copy_from_slice(&transfer.to.0.to_be_bytes());
        framed[41..49].copy_from_slice(&transfer.amount.amount().to_be_bytes());

        let digest = Sha256::digest(framed);
        let mut out = [0_u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SettlementFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SettlementFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SettlementFingerprint({})", &self.to_hex()[..16])
    }
}
