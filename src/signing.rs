//! Phantom-agent EIP-712 signing for exchange actions.
//!
//! Trading actions are signed in two steps. First the action is reduced to
//! a 32-byte `connection_id`: the canonical MessagePack encoding of the
//! action, followed by the nonce in big-endian order and a single `0x00`
//! vault flag, hashed with Keccak-256. Then an `Agent { source,
//! connectionId }` struct wrapping that hash is signed as EIP-712 typed
//! data against the exchange domain. The server repeats both steps and
//! recovers the signer address from the signature, so any byte-level
//! divergence in the encoding surfaces as a signature from an address the
//! server has never seen.
//!
//! Every hash here is Keccak-256 (the Ethereum variant). NIST SHA3-256 is
//! a different function and produces signatures the server rejects.
//!
//! After producing a signature, [`sign_connection_id`] recovers the address
//! locally and compares it with the signer's. A mismatch is logged but the
//! signature is still returned; the warning is the primary diagnostic for
//! an encoding bug, and the server's rejection will carry an address that
//! matches the logged one.

use alloy::{
    primitives::{Address, B256, keccak256},
    signers::{SignerSync, local::PrivateKeySigner},
    sol,
    sol_types::{SolStruct, eip712_domain},
};

use crate::{
    Chain,
    error::{Error, Result},
    types::{Action, Signature},
};

sol! {
    /// The phantom-agent envelope the exchange verifies. An API wallet
    /// signs this on behalf of the main account; the account itself never
    /// exposes its key.
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

/// EIP-712 domain the exchange verifies L1 action signatures against.
/// Identical for mainnet and testnet; the network is distinguished by the
/// agent `source` field instead.
const EXCHANGE_EIP712_DOMAIN: alloy::sol_types::Eip712Domain = eip712_domain! {
    name: "Exchange",
    version: "1",
    chain_id: 1337,
    verifying_contract: Address::ZERO,
};

/// Encodes an action into its canonical MessagePack form.
///
/// `rmp_serde::to_vec_named` emits maps with string keys in struct
/// declaration order, which is the canonical layout the server hashes.
pub fn encode_action(action: &Action) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(action)?)
}

/// Appends the signing suffix to encoded action bytes: the nonce as eight
/// big-endian bytes, then the `0x00` "no vault" flag.
pub(crate) fn signing_buffer(mut action_bytes: Vec<u8>, nonce: u64) -> Vec<u8> {
    action_bytes.extend(nonce.to_be_bytes());
    action_bytes.push(0);
    action_bytes
}

/// Computes the `connection_id` for an action: Keccak-256 over the
/// canonical MessagePack encoding plus the signing suffix.
pub fn action_hash(action: &Action, nonce: u64) -> Result<B256> {
    let bytes = signing_buffer(encode_action(action)?, nonce);
    Ok(keccak256(bytes))
}

/// Computes the `connection_id` for an action hashed over its JSON bytes.
///
/// `updateLeverage` is the one action signed this way; everything else
/// goes through [`action_hash`].
pub fn json_action_hash(action: &Action, nonce: u64) -> Result<B256> {
    let bytes = signing_buffer(serde_json::to_vec(action)?, nonce);
    Ok(keccak256(bytes))
}

/// Signs a `connection_id` with the phantom-agent envelope.
///
/// The agent `source` is `"a"` on mainnet and `"b"` on testnet. The
/// returned signature has `v` in `{27, 28}`.
pub fn sign_connection_id(
    signer: &PrivateKeySigner,
    chain: Chain,
    connection_id: B256,
) -> Result<Signature> {
    let agent = Agent {
        source: chain.agent_source().to_string(),
        connectionId: connection_id,
    };
    let digest = agent.eip712_signing_hash(&EXCHANGE_EIP712_DOMAIN);
    let signature = signer.sign_hash_sync(&digest)?;

    // Local recovery diagnostic: a mismatch here means the action bytes the
    // server hashes will recover an unknown address and the request will be
    // rejected. Transmit anyway; the log pinpoints the encoding fault.
    match signature.recover_address_from_prehash(&digest) {
        Ok(recovered) if recovered == signer.address() => {}
        Ok(recovered) => log::warn!(
            "signature recovers {recovered}, expected {}; action encoding is suspect",
            signer.address()
        ),
        Err(err) => log::warn!("unable to recover address from own signature: {err}"),
    }

    Ok(signature.into())
}

/// Hashes and signs an action in one step, choosing the hash input the
/// action requires.
pub fn sign_action(
    signer: &PrivateKeySigner,
    chain: Chain,
    action: &Action,
    nonce: u64,
) -> Result<Signature> {
    let connection_id = match action {
        Action::UpdateLeverage { .. } => json_action_hash(action, nonce)?,
        _ => action_hash(action, nonce)?,
    };
    sign_connection_id(signer, chain, connection_id)
}

/// Recovers the address that produced `signature` over the agent digest for
/// `connection_id`. Test and reconciliation helper; the server performs the
/// same computation.
pub fn recover_agent_signer(
    chain: Chain,
    connection_id: B256,
    signature: &Signature,
) -> Result<Address> {
    let agent = Agent {
        source: chain.agent_source().to_string(),
        connectionId: connection_id,
    };
    let digest = agent.eip712_signing_hash(&EXCHANGE_EIP712_DOMAIN);
    let parity = match signature.v {
        27 => false,
        28 => true,
        v => return Err(Error::ExchangeApi(format!("invalid recovery id: {v}"))),
    };
    let sig = alloy::signers::Signature::new(signature.r, signature.s, parity);
    sig.recover_address_from_prehash(&digest)
        .map_err(|err| Error::ExchangeApi(format!("recovery failed: {err}")))
}

#[cfg(test)]
mod tests {
    use rust_decimal::dec;

    use super::*;
    use crate::types::{
        BatchCancel, BatchOrder, Cancel, OrderEntry, OrderTypePlacement, TimeInForce,
    };

    fn test_signer() -> PrivateKeySigner {
        "e908f86dbb4d55ac876378565aafeabc187f6690f046459397b17d9b9a19688e"
            .parse()
            .unwrap()
    }

    fn order_action() -> Action {
        Action::Order(BatchOrder::single(OrderEntry {
            asset: 1,
            is_buy: true,
            limit_px: dec!(87000.0),
            sz: dec!(0.001),
            reduce_only: false,
            order_type: OrderTypePlacement::Limit {
                tif: TimeInForce::Gtc,
            },
        }))
    }

    fn cancel_action() -> Action {
        Action::Cancel(BatchCancel {
            cancels: vec![Cancel {
                asset: 1,
                oid: 45564725639,
            }],
        })
    }

    fn subslice(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn order_action_encodes_as_three_key_map() {
        let bytes = encode_action(&order_action()).unwrap();
        assert_eq!(bytes[0], 0x83, "outer map must declare 3 entries");
        for key in ["type", "order", "orders", "grouping", "na"] {
            assert!(
                subslice(&bytes, key.as_bytes()),
                "encoding missing {key:?}"
            );
        }
    }

    #[test]
    fn order_entry_encodes_price_without_trailing_zero() {
        let bytes = encode_action(&order_action()).unwrap();
        // fixstr(5) "87000", never fixstr(7) "87000.0"
        assert!(subslice(&bytes, &[0xa5, b'8', b'7', b'0', b'0', b'0']));
        assert!(!subslice(&bytes, b"87000.0"));
    }

    #[test]
    fn cancel_action_encodes_as_two_key_map() {
        let bytes = encode_action(&cancel_action()).unwrap();
        assert_eq!(bytes[0], 0x82, "outer map must declare 2 entries");
        assert!(subslice(&bytes, b"cancel"));
        assert!(subslice(&bytes, b"cancels"));
    }

    #[test]
    fn reference_decoder_reconstructs_the_action() {
        let bytes = encode_action(&order_action()).unwrap();
        let value: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "order");
        assert_eq!(value["grouping"], "na");
        let entry = &value["orders"][0];
        assert_eq!(entry["a"], 1);
        assert_eq!(entry["b"], true);
        assert_eq!(entry["p"], "87000");
        assert_eq!(entry["s"], "0.001");
        assert_eq!(entry["r"], false);
        assert_eq!(entry["t"]["limit"]["tif"], "Gtc");
    }

    #[test]
    fn signing_buffer_appends_big_endian_nonce_and_vault_flag() {
        let nonce = 0x0102030405060708u64;
        let buf = signing_buffer(vec![0xde, 0xad], nonce);
        assert_eq!(
            &buf[2..],
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x00]
        );
    }

    #[test]
    fn action_hash_is_nonce_sensitive() {
        let action = order_action();
        let a = action_hash(&action, 1).unwrap();
        let b = action_hash(&action, 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn json_hash_differs_from_msgpack_hash() {
        let action = order_action();
        assert_ne!(
            action_hash(&action, 7).unwrap(),
            json_action_hash(&action, 7).unwrap()
        );
    }

    #[test]
    fn signature_recovers_signer_address() {
        let signer = test_signer();
        let connection_id = action_hash(&order_action(), 1690393044548).unwrap();

        for chain in [Chain::Mainnet, Chain::Testnet] {
            let sig = sign_connection_id(&signer, chain, connection_id).unwrap();
            assert!(sig.v == 27 || sig.v == 28);
            let recovered = recover_agent_signer(chain, connection_id, &sig).unwrap();
            assert_eq!(recovered, signer.address());
        }
    }

    #[test]
    fn mainnet_and_testnet_signatures_differ() {
        let signer = test_signer();
        let connection_id = action_hash(&cancel_action(), 42).unwrap();
        let mainnet = sign_connection_id(&signer, Chain::Mainnet, connection_id).unwrap();
        let testnet = sign_connection_id(&signer, Chain::Testnet, connection_id).unwrap();
        assert_ne!(mainnet.to_string(), testnet.to_string());
    }

    #[test]
    fn update_leverage_signs_over_json() {
        let signer = test_signer();
        let action = Action::UpdateLeverage {
            asset: 0,
            is_cross: true,
            leverage: 10,
        };
        let sig = sign_action(&signer, Chain::Mainnet, &action, 99).unwrap();
        let expected = json_action_hash(&action, 99).unwrap();
        let recovered = recover_agent_signer(Chain::Mainnet, expected, &sig).unwrap();
        assert_eq!(recovered, signer.address());
    }
}
