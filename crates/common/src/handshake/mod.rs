mod messages;
mod stream;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::claims::{
    encode_claim, encode_payload, verify_signature, ClaimError, ClaimType, SignedClaim,
};
use crate::crypto::PublicKey;
use crate::sigchain::{ClaimStore, Sigchain, SigchainError};

pub use messages::ClaimMessage;
pub use stream::{FramedStream, StreamError, MAX_FRAME_SIZE};

/// Where a handshake currently stands
///
/// Both sides track their position with the same enum; error variants carry
/// it so a failure names the step it happened at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    SentIntermediary,
    AwaitingIntermediary,
    ReceivedIntermediary,
    SentCounterIntermediary,
    AwaitingCounter,
    ReceivedCounter,
    SentDoubleSigned,
    AwaitingDoubleSigned,
    Committed,
    Aborted,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError<E: std::error::Error + Send + Sync + 'static> {
    /// The counterpart's signature did not verify against its key
    #[error("counterpart signature failed verification")]
    SignatureInvalid,
    /// The counterpart returned bytes other than the payload both sides
    /// agreed to sign. Logged as a security event.
    #[error("counterpart substituted a different payload")]
    PayloadMismatch,
    #[error("handshake timed out in state {0:?}")]
    Timeout(HandshakeState),
    /// The counterpart closed the stream before the protocol finished
    #[error("handshake aborted by counterpart in state {0:?}")]
    Aborted(HandshakeState),
    /// A frame that decodes fine but is not legal in the current state
    #[error("unexpected message in state {0:?}")]
    Unexpected(HandshakeState),
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Sigchain(#[from] SigchainError<E>),
}

#[derive(Debug, Clone, Copy)]
pub struct HandshakeConfig {
    /// Budget for each individual wait on the counterpart
    pub step_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
        }
    }
}

async fn recv_step<R, W, E>(
    stream: &mut FramedStream<R, W>,
    state: HandshakeState,
    config: &HandshakeConfig,
) -> Result<ClaimMessage, HandshakeError<E>>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(config.step_timeout, stream.recv()).await {
        Err(_) => Err(HandshakeError::Timeout(state)),
        Ok(Err(e)) => Err(e.into()),
        Ok(Ok(None)) => Err(HandshakeError::Aborted(state)),
        Ok(Ok(Some(message))) => Ok(message),
    }
}

/// Check that a doubly-signed node-link claim between `a` and `b` is fully
/// valid on its own: right shape, both signatures present and verifying.
fn verify_double_signed<E>(
    claim: &SignedClaim,
    a: &PublicKey,
    b: &PublicKey,
) -> Result<(), HandshakeError<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    if claim.link_counterpart(a) != Some(*b) {
        return Err(HandshakeError::PayloadMismatch);
    }
    if claim.signatures.len() != 2 {
        return Err(HandshakeError::SignatureInvalid);
    }
    for signer in [a, b] {
        let sig = claim
            .signature_by(signer)
            .ok_or(HandshakeError::SignatureInvalid)?;
        if !verify_signature(&claim.payload, sig, signer) {
            return Err(HandshakeError::SignatureInvalid);
        }
    }
    Ok(())
}

/// Append an already-verified link claim to the local chain if no link to
/// that peer exists yet. Reconciles the case where the counterpart
/// committed in an earlier attempt that we never finished.
async fn adopt_if_missing<S: ClaimStore>(
    sigchain: &Sigchain<S>,
    peer: &PublicKey,
    claim: &SignedClaim,
) -> Result<(), SigchainError<S::Error>> {
    if sigchain.find_node_link(peer).await?.is_some() {
        return Ok(());
    }
    let mut txn = sigchain.transaction().await?;
    let payload = &claim.payload;
    if payload.issuer == sigchain.node_id()
        && payload.sequence_number == txn.next_sequence()
        && payload.prev_digest == txn.prev_digest()
    {
        // our own drafted framing still fits the chain
        txn.append_signed(claim.clone())?;
    } else {
        txn.append_adopted(claim.clone())?;
    }
    txn.commit().await
}

/// Drive the initiator side of the cross-sign handshake
///
/// Drafts a node-link claim against the local chain tail, exchanges
/// signatures with the responder over `stream`, and commits the
/// doubly-signed claim locally only after the responder has acknowledged
/// its own commit. Returns the committed claim.
///
/// Re-running against an already-linked responder is a no-op that returns
/// the existing claim. Any error before the local commit leaves the chain
/// untouched.
pub async fn initiate<S, R, W>(
    sigchain: &Sigchain<S>,
    responder: &PublicKey,
    stream: &mut FramedStream<R, W>,
    config: &HandshakeConfig,
) -> Result<SignedClaim, HandshakeError<S::Error>>
where
    S: ClaimStore,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let node_id = sigchain.node_id();
    if let Some(existing) = sigchain.find_node_link(responder).await? {
        debug!(peer = %responder, "already linked, skipping handshake");
        stream.close().await?;
        return Ok(existing);
    }

    let (payload, own_signature) = sigchain.draft_node_link(responder).await?;
    let payload_bytes = encode_payload(&payload)?;

    let mut state = HandshakeState::SentIntermediary;
    stream
        .send(&ClaimMessage::SinglySigned(SignedClaim {
            payload: payload.clone(),
            signatures: vec![own_signature.clone()],
        }))
        .await?;
    debug!(peer = %responder, state = ?state, "sent claim intermediary");

    state = HandshakeState::AwaitingCounter;
    let claim = match recv_step(stream, state, config).await? {
        ClaimMessage::SinglySigned(counter) => {
            state = HandshakeState::ReceivedCounter;
            debug!(peer = %responder, state = ?state, "received counter intermediary");
            if encode_payload(&counter.payload)? != payload_bytes {
                warn!(peer = %responder, "responder countersigned a different payload");
                return Err(HandshakeError::PayloadMismatch);
            }
            let responder_signature = match counter.signatures.as_slice() {
                [sig] if sig.signer == *responder => sig.clone(),
                _ => return Err(HandshakeError::SignatureInvalid),
            };
            if !verify_signature(&payload, &responder_signature, responder) {
                return Err(HandshakeError::SignatureInvalid);
            }

            let claim = SignedClaim {
                payload,
                signatures: vec![own_signature, responder_signature],
            };
            state = HandshakeState::SentDoubleSigned;
            stream.send(&ClaimMessage::DoublySigned(claim.clone())).await?;
            debug!(peer = %responder, state = ?state, "sent finished claim");

            state = HandshakeState::AwaitingDoubleSigned;
            match recv_step(stream, state, config).await? {
                ClaimMessage::DoublySigned(echo) => {
                    // the ack must be the exact claim both sides now hold
                    if encode_claim(&echo)? != encode_claim(&claim)? {
                        warn!(peer = %responder, "responder acknowledged a different claim");
                        return Err(HandshakeError::PayloadMismatch);
                    }
                }
                ClaimMessage::SinglySigned(_) => {
                    return Err(HandshakeError::Unexpected(state));
                }
            }

            let mut txn = sigchain.transaction().await?;
            txn.append_signed(claim.clone())?;
            txn.commit().await?;
            claim
        }
        ClaimMessage::DoublySigned(existing) => {
            // responder already holds a committed link from an earlier
            // attempt; verify it in full and adopt it if we lost ours
            state = HandshakeState::ReceivedCounter;
            debug!(peer = %responder, state = ?state, "responder reports an existing link");
            verify_double_signed(&existing, &node_id, responder)?;
            adopt_if_missing(sigchain, responder, &existing).await?;
            existing
        }
    };

    state = HandshakeState::Committed;
    debug!(peer = %responder, state = ?state, "cross-sign committed");
    stream.close().await?;
    Ok(claim)
}

/// Drive the responder side of the cross-sign handshake
///
/// `initiator` is the counterpart's key as established out of band (for the
/// QUIC transport, the connection's node identity). The responder commits
/// first, then acknowledges with its committed claim; an initiator that
/// never receives the ack finds the link on re-attempt.
pub async fn respond<S, R, W>(
    sigchain: &Sigchain<S>,
    initiator: &PublicKey,
    stream: &mut FramedStream<R, W>,
    config: &HandshakeConfig,
) -> Result<SignedClaim, HandshakeError<S::Error>>
where
    S: ClaimStore,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let node_id = sigchain.node_id();

    let mut state = HandshakeState::AwaitingIntermediary;
    let intermediary = match recv_step(stream, state, config).await? {
        ClaimMessage::SinglySigned(intermediary) => intermediary,
        ClaimMessage::DoublySigned(_) => return Err(HandshakeError::Unexpected(state)),
    };
    state = HandshakeState::ReceivedIntermediary;
    debug!(peer = %initiator, state = ?state, "received claim intermediary");

    let payload = intermediary.payload.clone();
    match &payload.claim_type {
        ClaimType::NodeLink { linked_node } if *linked_node == node_id => {}
        _ => {
            warn!(peer = %initiator, "intermediary does not link this node");
            return Err(HandshakeError::PayloadMismatch);
        }
    }
    if payload.issuer != *initiator {
        warn!(peer = %initiator, "intermediary issuer does not match the connection identity");
        return Err(HandshakeError::PayloadMismatch);
    }
    let initiator_signature = match intermediary.signatures.as_slice() {
        [sig] if sig.signer == *initiator => sig.clone(),
        _ => return Err(HandshakeError::SignatureInvalid),
    };
    if !verify_signature(&payload, &initiator_signature, initiator) {
        return Err(HandshakeError::SignatureInvalid);
    }

    if let Some(existing) = sigchain.find_node_link(initiator).await? {
        // already linked in an earlier attempt: skip straight to the ack
        debug!(peer = %initiator, "already linked, echoing committed claim");
        stream.send(&ClaimMessage::DoublySigned(existing.clone())).await?;
        stream.close().await?;
        return Ok(existing);
    }

    let payload_bytes = encode_payload(&payload)?;
    let own_signature = sigchain.sign(&payload)?;

    state = HandshakeState::SentCounterIntermediary;
    stream
        .send(&ClaimMessage::SinglySigned(SignedClaim {
            payload: payload.clone(),
            signatures: vec![own_signature.clone()],
        }))
        .await?;
    debug!(peer = %initiator, state = ?state, "countersigned claim intermediary");

    state = HandshakeState::AwaitingDoubleSigned;
    let claim = match recv_step(stream, state, config).await? {
        ClaimMessage::DoublySigned(claim) => claim,
        ClaimMessage::SinglySigned(_) => return Err(HandshakeError::Unexpected(state)),
    };
    state = HandshakeState::ReceivedCounter;
    debug!(peer = %initiator, state = ?state, "received finished claim");

    // substitution defense: the finished claim must carry exactly the
    // payload we agreed to sign and exactly the two expected signatures
    if encode_payload(&claim.payload)? != payload_bytes {
        warn!(peer = %initiator, "finished claim substitutes a different payload");
        return Err(HandshakeError::PayloadMismatch);
    }
    if claim.signatures != vec![initiator_signature, own_signature] {
        warn!(peer = %initiator, "finished claim substitutes different signatures");
        return Err(HandshakeError::PayloadMismatch);
    }

    let mut txn = sigchain.transaction().await?;
    txn.append_adopted(claim.clone())?;
    txn.commit().await?;

    state = HandshakeState::SentDoubleSigned;
    stream.send(&ClaimMessage::DoublySigned(claim.clone())).await?;
    debug!(peer = %initiator, state = ?state, "acknowledged with committed claim");
    state = HandshakeState::Committed;
    debug!(peer = %initiator, state = ?state, "cross-sign committed");
    stream.close().await?;
    Ok(claim)
}
