//! Key tweaking and multisig script assembly.
//!
//! The commitment merkle root, read as a big-endian scalar, is added to
//! every initial key to derive the next attestation key/script. A zero
//! tweak represents the genesis key/script and is resolved by callers
//! before reaching the arithmetic here.

use bitcoin::blockdata::opcodes::all as opcodes;
use bitcoin::blockdata::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey, Verification};
use bitcoin::{Address, Network, Script, ScriptBuf};

use crate::commitment::CommitmentHash;
use crate::error::{Error, Result};
use crate::MAX_MULTISIG_KEYS;

/// A DER-encoded ECDSA signature with its trailing sighash byte.
pub type Sig = Vec<u8>;

fn tweak_scalar(tweak: &CommitmentHash) -> Result<Scalar> {
    Scalar::from_be_bytes(tweak.to_byte_array()).map_err(|_| Error::InvalidTweak)
}

/// Tweak a secret key: `sk' = (sk + tweak) mod n`.
///
/// Fails when the result is the zero key.
pub fn tweak_secret_key(sk: &SecretKey, tweak: &CommitmentHash) -> Result<SecretKey> {
    let scalar = tweak_scalar(tweak)?;
    Ok(sk.add_tweak(&scalar)?)
}

/// Tweak a public key: `pk' = pk + tweak·G`.
///
/// Fails on the point at infinity.
pub fn tweak_public_key<C: Verification>(
    secp: &Secp256k1<C>,
    pk: &PublicKey,
    tweak: &CommitmentHash,
) -> Result<PublicKey> {
    let scalar = tweak_scalar(tweak)?;
    Ok(pk.add_exp_tweak(secp, &scalar)?)
}

/// Parse a canonical `OP_M <pk>... OP_N OP_CHECKMULTISIG` redeem script.
///
/// Every pubkey must be 33-byte compressed; `1 ≤ M ≤ N ≤ 15`. Returns the
/// pubkeys in script order together with M.
pub fn parse_redeem_script(script: &Script) -> Result<(Vec<PublicKey>, usize)> {
    let instructions: Vec<Instruction<'_>> = script
        .instructions()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::InvalidRedeemScript(e.to_string()))?;

    if instructions.len() < 4 {
        return Err(Error::InvalidRedeemScript("script too short".into()));
    }

    let m = match &instructions[0] {
        Instruction::Op(op) => pushnum_value(op.to_u8())
            .ok_or_else(|| Error::InvalidRedeemScript("missing OP_M".into()))?,
        _ => return Err(Error::InvalidRedeemScript("missing OP_M".into())),
    };

    let mut pubkeys = Vec::new();
    for instruction in &instructions[1..instructions.len() - 2] {
        match instruction {
            Instruction::PushBytes(bytes) if bytes.len() == 33 => {
                pubkeys.push(PublicKey::from_slice(bytes.as_bytes())?);
            }
            _ => {
                return Err(Error::InvalidRedeemScript(
                    "expected 33-byte compressed pubkey push".into(),
                ))
            }
        }
    }

    let n = match &instructions[instructions.len() - 2] {
        Instruction::Op(op) => pushnum_value(op.to_u8())
            .ok_or_else(|| Error::InvalidRedeemScript("missing OP_N".into()))?,
        _ => return Err(Error::InvalidRedeemScript("missing OP_N".into())),
    };

    match &instructions[instructions.len() - 1] {
        Instruction::Op(op) if *op == opcodes::OP_CHECKMULTISIG => {}
        _ => {
            return Err(Error::InvalidRedeemScript(
                "missing OP_CHECKMULTISIG".into(),
            ))
        }
    }

    if n != pubkeys.len() || m < 1 || m > n || n > MAX_MULTISIG_KEYS {
        return Err(Error::InvalidMultisig(m, n));
    }

    Ok((pubkeys, m))
}

fn pushnum_value(byte: u8) -> Option<usize> {
    let low = opcodes::OP_PUSHNUM_1.to_u8();
    let high = opcodes::OP_PUSHNUM_16.to_u8();
    if (low..=high).contains(&byte) {
        Some((byte - low + 1) as usize)
    } else {
        None
    }
}

/// Build the M-of-N redeem script and its P2SH address.
///
/// Pubkey order is significant and preserved.
pub fn create_multisig(
    pubkeys: &[PublicKey],
    m: usize,
    network: Network,
) -> Result<(Address, ScriptBuf)> {
    let n = pubkeys.len();
    if m < 1 || m > n || n > MAX_MULTISIG_KEYS {
        return Err(Error::InvalidMultisig(m, n));
    }

    let mut builder = Builder::new().push_int(m as i64);
    for pk in pubkeys {
        builder = builder.push_slice(pk.serialize());
    }
    let script = builder
        .push_int(n as i64)
        .push_opcode(opcodes::OP_CHECKMULTISIG)
        .into_script();

    let address = Address::p2sh(&script, network)
        .map_err(|e| Error::InvalidAddress(e.to_string()))?;
    Ok((address, script))
}

/// Parse an M-of-N P2SH signature script into its DER signatures and
/// redeem script. The leading OP_0 push is consumed and not returned.
///
/// An empty script parses to empty signatures and an empty redeem script.
pub fn parse_script_sig(bytes: &[u8]) -> Result<(Vec<Sig>, Vec<u8>)> {
    if bytes.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let script = Script::from_bytes(bytes);
    let mut pushes: Vec<Vec<u8>> = Vec::new();
    for instruction in script.instructions() {
        match instruction.map_err(|e| Error::InvalidScriptSig(e.to_string()))? {
            Instruction::PushBytes(push) => pushes.push(push.as_bytes().to_vec()),
            Instruction::Op(op) => {
                return Err(Error::InvalidScriptSig(format!("unexpected opcode {op}")))
            }
        }
    }

    // leading OP_0 (empty push) absorbs the CHECKMULTISIG off-by-one
    if pushes.is_empty() || !pushes[0].is_empty() {
        return Err(Error::InvalidScriptSig("missing leading OP_0".into()));
    }
    let redeem_script = pushes.pop().filter(|s| !s.is_empty()).ok_or_else(|| {
        Error::InvalidScriptSig("missing redeem script push".into())
    })?;

    Ok((pushes.split_off(1), redeem_script))
}

/// Assemble the final signature script: OP_0, the signatures in order,
/// then the redeem script push.
pub fn create_script_sig(sigs: &[Sig], redeem_script: &[u8]) -> Result<ScriptBuf> {
    let mut builder = Builder::new().push_opcode(opcodes::OP_PUSHBYTES_0);
    for sig in sigs {
        let push = PushBytesBuf::try_from(sig.clone())
            .map_err(|_| Error::InvalidScriptSig("signature push too long".into()))?;
        builder = builder.push_slice(push);
    }
    let redeem = PushBytesBuf::try_from(redeem_script.to_vec())
        .map_err(|_| Error::InvalidScriptSig("redeem script push too long".into()))?;
    Ok(builder.push_slice(redeem).into_script())
}

/// Standard P2PKH address for a pubkey, single-key attestation case.
pub fn p2pkh_address(pk: &PublicKey, network: Network) -> Address {
    Address::p2pkh(bitcoin::PublicKey::new(*pk), network)
}
