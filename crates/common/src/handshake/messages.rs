use serde::{Deserialize, Serialize};

use crate::claims::SignedClaim;

/// The closed set of frames the cross-sign protocol exchanges
///
/// There is deliberately no abort frame; either side aborts by closing the
/// stream. Any bytes that do not decode to one of these shapes are treated
/// as malformed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClaimMessage {
    /// A claim intermediary carrying exactly one party's signature
    SinglySigned(SignedClaim),
    /// The finished claim carrying both parties' signatures
    DoublySigned(SignedClaim),
}

impl ClaimMessage {
    pub fn claim(&self) -> &SignedClaim {
        match self {
            ClaimMessage::SinglySigned(claim) => claim,
            ClaimMessage::DoublySigned(claim) => claim,
        }
    }
}
