//! The transaction model (C5): five typed variants, canonical RLP encoding, per-variant signing
//! hashes, and secp256k1 sender recovery (delegated to `alloy_primitives::Signature`, the named
//! out-of-scope curve-arithmetic primitive, after this module's own EIP-2 `r`/`s` range check).

use alloy_primitives::{keccak256, uint, Address, Bytes, Signature, B256, U256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header, EMPTY_STRING_CODE};

use crate::constants::{DELEGATION_DESIGNATOR_LEN, DELEGATION_DESIGNATOR_PREFIX};

/// The secp256k1 curve order `n`.
const SECP256K1N: U256 =
    uint!(0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141_U256);

/// A signature was out of the curve's valid range, or failed to recover an address.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureValidityError {
    /// `r` is zero or `>= secp256k1n`.
    #[error("signature r is out of range")]
    InvalidR,
    /// `s` is zero or exceeds half the curve order (EIP-2's low-s requirement).
    #[error("signature s is out of range")]
    InvalidS,
    /// The signature does not recover to a valid public key.
    #[error("signature failed to recover an address")]
    RecoveryFailed,
}

/// Rejects a malleated or out-of-range `(r, s)` pair before recovery is attempted: `r` must be in
/// `(0, secp256k1n)`, and `s` must be in `(0, secp256k1n / 2]` (EIP-2).
fn check_signature_bounds(r: U256, s: U256) -> Result<(), SignatureValidityError> {
    if r.is_zero() || r >= SECP256K1N {
        return Err(SignatureValidityError::InvalidR);
    }
    if s.is_zero() || s > (SECP256K1N >> 1) {
        return Err(SignatureValidityError::InvalidS);
    }
    Ok(())
}

/// The destination of a transaction: either a call to an existing address, or contract creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// Deploys a new contract; the address is derived from the sender and nonce (or salt).
    Create,
    /// Calls (or transfers value to) an existing address.
    Call(Address),
}

impl TxKind {
    /// The target address, or `None` for contract creation.
    pub const fn to(&self) -> Option<Address> {
        match self {
            Self::Create => None,
            Self::Call(addr) => Some(*addr),
        }
    }

    /// Whether this is a contract-creation transaction.
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::Create)
    }
}

impl Encodable for TxKind {
    fn length(&self) -> usize {
        match self {
            Self::Create => 1,
            Self::Call(addr) => addr.length(),
        }
    }

    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            Self::Create => out.put_u8(EMPTY_STRING_CODE),
            Self::Call(addr) => addr.encode(out),
        }
    }
}

impl Decodable for TxKind {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        if let Some(&first) = buf.first() {
            if first == EMPTY_STRING_CODE {
                *buf = &buf[1..];
                return Ok(Self::Create);
            }
        }
        Ok(Self::Call(Address::decode(buf)?))
    }
}

/// One entry of an EIP-2930 access list: an address plus the storage slots pre-warmed for it.
#[derive(Debug, Clone, PartialEq, Eq, Default, alloy_rlp::RlpEncodable, alloy_rlp::RlpDecodable)]
pub struct AccessListItem {
    /// The pre-warmed address.
    pub address: Address,
    /// The pre-warmed storage slots at `address`.
    pub storage_keys: Vec<B256>,
}

/// An EIP-2930 access list.
pub type AccessList = Vec<AccessListItem>;

/// An EIP-7702 authorization tuple: a signed statement from `authority` that their EOA code
/// should delegate to `address`.
#[derive(Debug, Clone, PartialEq, Eq, alloy_rlp::RlpEncodable, alloy_rlp::RlpDecodable)]
pub struct Authorization {
    /// The chain this authorization is valid on, or zero for any chain.
    pub chain_id: U256,
    /// The address the authority's code should delegate to.
    pub address: Address,
    /// The authority's expected nonce at the time this authorization is applied.
    pub nonce: u64,
    /// Signature recovery id.
    pub y_parity: u8,
    /// Signature `r`.
    pub r: U256,
    /// Signature `s`.
    pub s: U256,
}

impl Authorization {
    /// `keccak256(0x05 ‖ rlp([chain_id, address, nonce]))`, the EIP-7702 authorization preimage.
    pub fn signing_hash(&self) -> B256 {
        let mut buf = vec![0x05];
        encode_fields(&mut buf, &[&self.chain_id, &self.address, &self.nonce]);
        keccak256(buf)
    }

    /// Recovers the authorizing address from the signature over [`Self::signing_hash`].
    pub fn recover_authority(&self) -> Result<Address, SignatureValidityError> {
        check_signature_bounds(self.r, self.s)?;
        let signature = Signature::new(self.r, self.s, self.y_parity != 0);
        signature
            .recover_address_from_prehash(&self.signing_hash())
            .map_err(|_| SignatureValidityError::RecoveryFailed)
    }
}

/// Builds the 23-byte EIP-7702 delegation designator for `target`.
pub fn delegation_designator(target: Address) -> Bytes {
    let mut out = Vec::with_capacity(DELEGATION_DESIGNATOR_LEN);
    out.extend_from_slice(&DELEGATION_DESIGNATOR_PREFIX);
    out.extend_from_slice(target.as_slice());
    out.into()
}

/// If `code` is a valid EIP-7702 delegation designator, returns the delegated-to address.
pub fn resolve_delegation(code: &[u8]) -> Option<Address> {
    if code.len() == DELEGATION_DESIGNATOR_LEN && code[..3] == DELEGATION_DESIGNATOR_PREFIX {
        Some(Address::from_slice(&code[3..]))
    } else {
        None
    }
}

fn encode_fields(out: &mut Vec<u8>, fields: &[&dyn Encodable]) {
    let payload_length: usize = fields.iter().map(|f| f.length()).sum();
    Header { list: true, payload_length }.encode(out);
    for field in fields {
        field.encode(out);
    }
}

/// A legacy transaction, optionally EIP-155 replay-protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    /// Account nonce.
    pub nonce: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Maximum gas the transaction may consume.
    pub gas_limit: u64,
    /// Call target, or `Create`.
    pub to: TxKind,
    /// Value transferred, in wei.
    pub value: U256,
    /// Calldata / init code.
    pub input: Bytes,
    /// Raw `v` as transmitted: `27`/`28` pre-EIP-155, or `35 + 2·chain_id + y_parity` after.
    pub v: u64,
    /// Signature `r`.
    pub r: U256,
    /// Signature `s`.
    pub s: U256,
}

impl LegacyTx {
    /// The chain id implied by `v`, or `None` if this transaction predates EIP-155.
    pub fn chain_id(&self) -> Option<U256> {
        if self.v == 27 || self.v == 28 {
            None
        } else {
            Some(U256::from((self.v - 35) / 2))
        }
    }

    fn y_parity(&self) -> bool {
        if self.v == 27 || self.v == 28 {
            self.v == 28
        } else {
            (self.v - 35) % 2 == 1
        }
    }

    fn fields(&self) -> [&dyn Encodable; 6] {
        [&self.nonce, &self.gas_price, &self.gas_limit, &self.to, &self.value, &self.input]
    }

    /// The EIP-155 (or pre-EIP-155) signing hash.
    pub fn signing_hash(&self) -> B256 {
        let mut buf = Vec::new();
        match self.chain_id() {
            None => encode_fields(&mut buf, &self.fields()),
            Some(chain_id) => {
                let zero = 0u8;
                let mut extended: Vec<&dyn Encodable> = self.fields().into();
                extended.push(&chain_id);
                extended.push(&zero);
                extended.push(&zero);
                encode_fields(&mut buf, &extended);
            }
        }
        keccak256(buf)
    }

    fn encode_payload(&self, out: &mut Vec<u8>) {
        let mut fields: Vec<&dyn Encodable> = self.fields().into();
        fields.push(&self.v);
        fields.push(&self.r);
        fields.push(&self.s);
        encode_fields(out, &fields);
    }

    fn decode_payload(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        Ok(Self {
            nonce: u64::decode(buf)?,
            gas_price: u128::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            to: TxKind::decode(buf)?,
            value: U256::decode(buf)?,
            input: Bytes::decode(buf)?,
            v: u64::decode(buf)?,
            r: U256::decode(buf)?,
            s: U256::decode(buf)?,
        })
    }
}

macro_rules! typed_tx {
    ($name:ident { $($field:ident : $ty:ty),+ $(,)? }) => {
        /// A typed transaction; see the EIP that introduced its type byte for field semantics.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            $(pub $field: $ty,)+
            /// Signature recovery id.
            pub y_parity: bool,
            /// Signature `r`.
            pub r: U256,
            /// Signature `s`.
            pub s: U256,
        }
    };
}

typed_tx!(Eip2930Tx {
    chain_id: U256,
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: TxKind,
    value: U256,
    input: Bytes,
    access_list: AccessList,
});

typed_tx!(Eip1559Tx {
    chain_id: U256,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: TxKind,
    value: U256,
    input: Bytes,
    access_list: AccessList,
});

typed_tx!(Eip4844Tx {
    chain_id: U256,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    input: Bytes,
    access_list: AccessList,
    max_fee_per_blob_gas: u128,
    blob_versioned_hashes: Vec<B256>,
});

typed_tx!(Eip7702Tx {
    chain_id: U256,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    input: Bytes,
    access_list: AccessList,
    authorizations: Vec<Authorization>,
});

/// Typed-transaction type bytes (EIP-2718).
pub mod tx_type {
    /// EIP-2930 access-list transaction.
    pub const EIP2930: u8 = 0x01;
    /// EIP-1559 fee-market transaction.
    pub const EIP1559: u8 = 0x02;
    /// EIP-4844 blob transaction.
    pub const EIP4844: u8 = 0x03;
    /// EIP-7702 set-code transaction.
    pub const EIP7702: u8 = 0x04;
}

impl Eip2930Tx {
    fn unsigned_fields(&self) -> [&dyn Encodable; 7] {
        [
            &self.chain_id,
            &self.nonce,
            &self.gas_price,
            &self.gas_limit,
            &self.to,
            &self.value,
            &self.input,
        ]
    }

    fn signing_hash(&self) -> B256 {
        let mut buf = vec![tx_type::EIP2930];
        let mut fields: Vec<&dyn Encodable> = self.unsigned_fields().into();
        fields.push(&self.access_list);
        encode_fields(&mut buf, &fields);
        keccak256(buf)
    }

    fn encode_payload(&self, out: &mut Vec<u8>) {
        let mut fields: Vec<&dyn Encodable> = self.unsigned_fields().into();
        fields.push(&self.access_list);
        fields.push(&self.y_parity);
        fields.push(&self.r);
        fields.push(&self.s);
        encode_fields(out, &fields);
    }

    fn decode_payload(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        Ok(Self {
            chain_id: U256::decode(buf)?,
            nonce: u64::decode(buf)?,
            gas_price: u128::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            to: TxKind::decode(buf)?,
            value: U256::decode(buf)?,
            input: Bytes::decode(buf)?,
            access_list: AccessList::decode(buf)?,
            y_parity: bool::decode(buf)?,
            r: U256::decode(buf)?,
            s: U256::decode(buf)?,
        })
    }
}

impl Eip1559Tx {
    fn unsigned_fields(&self) -> [&dyn Encodable; 8] {
        [
            &self.chain_id,
            &self.nonce,
            &self.max_priority_fee_per_gas,
            &self.max_fee_per_gas,
            &self.gas_limit,
            &self.to,
            &self.value,
            &self.input,
        ]
    }

    fn signing_hash(&self) -> B256 {
        let mut buf = vec![tx_type::EIP1559];
        let mut fields: Vec<&dyn Encodable> = self.unsigned_fields().into();
        fields.push(&self.access_list);
        encode_fields(&mut buf, &fields);
        keccak256(buf)
    }

    fn encode_payload(&self, out: &mut Vec<u8>) {
        let mut fields: Vec<&dyn Encodable> = self.unsigned_fields().into();
        fields.push(&self.access_list);
        fields.push(&self.y_parity);
        fields.push(&self.r);
        fields.push(&self.s);
        encode_fields(out, &fields);
    }

    fn decode_payload(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        Ok(Self {
            chain_id: U256::decode(buf)?,
            nonce: u64::decode(buf)?,
            max_priority_fee_per_gas: u128::decode(buf)?,
            max_fee_per_gas: u128::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            to: TxKind::decode(buf)?,
            value: U256::decode(buf)?,
            input: Bytes::decode(buf)?,
            access_list: AccessList::decode(buf)?,
            y_parity: bool::decode(buf)?,
            r: U256::decode(buf)?,
            s: U256::decode(buf)?,
        })
    }
}

impl Eip4844Tx {
    fn unsigned_fields(&self) -> [&dyn Encodable; 8] {
        [
            &self.chain_id,
            &self.nonce,
            &self.max_priority_fee_per_gas,
            &self.max_fee_per_gas,
            &self.gas_limit,
            &self.to,
            &self.value,
            &self.input,
        ]
    }

    fn signing_hash(&self) -> B256 {
        let mut buf = vec![tx_type::EIP4844];
        let mut fields: Vec<&dyn Encodable> = self.unsigned_fields().into();
        fields.push(&self.access_list);
        fields.push(&self.max_fee_per_blob_gas);
        fields.push(&self.blob_versioned_hashes);
        encode_fields(&mut buf, &fields);
        keccak256(buf)
    }

    fn encode_payload(&self, out: &mut Vec<u8>) {
        let mut fields: Vec<&dyn Encodable> = self.unsigned_fields().into();
        fields.push(&self.access_list);
        fields.push(&self.max_fee_per_blob_gas);
        fields.push(&self.blob_versioned_hashes);
        fields.push(&self.y_parity);
        fields.push(&self.r);
        fields.push(&self.s);
        encode_fields(out, &fields);
    }

    fn decode_payload(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        Ok(Self {
            chain_id: U256::decode(buf)?,
            nonce: u64::decode(buf)?,
            max_priority_fee_per_gas: u128::decode(buf)?,
            max_fee_per_gas: u128::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            to: Address::decode(buf)?,
            value: U256::decode(buf)?,
            input: Bytes::decode(buf)?,
            access_list: AccessList::decode(buf)?,
            max_fee_per_blob_gas: u128::decode(buf)?,
            blob_versioned_hashes: Vec::<B256>::decode(buf)?,
            y_parity: bool::decode(buf)?,
            r: U256::decode(buf)?,
            s: U256::decode(buf)?,
        })
    }
}

impl Eip7702Tx {
    fn unsigned_fields(&self) -> [&dyn Encodable; 8] {
        [
            &self.chain_id,
            &self.nonce,
            &self.max_priority_fee_per_gas,
            &self.max_fee_per_gas,
            &self.gas_limit,
            &self.to,
            &self.value,
            &self.input,
        ]
    }

    fn signing_hash(&self) -> B256 {
        let mut buf = vec![tx_type::EIP7702];
        let mut fields: Vec<&dyn Encodable> = self.unsigned_fields().into();
        fields.push(&self.access_list);
        fields.push(&self.authorizations);
        encode_fields(&mut buf, &fields);
        keccak256(buf)
    }

    fn encode_payload(&self, out: &mut Vec<u8>) {
        let mut fields: Vec<&dyn Encodable> = self.unsigned_fields().into();
        fields.push(&self.access_list);
        fields.push(&self.authorizations);
        fields.push(&self.y_parity);
        fields.push(&self.r);
        fields.push(&self.s);
        encode_fields(out, &fields);
    }

    fn decode_payload(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        Ok(Self {
            chain_id: U256::decode(buf)?,
            nonce: u64::decode(buf)?,
            max_priority_fee_per_gas: u128::decode(buf)?,
            max_fee_per_gas: u128::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            to: Address::decode(buf)?,
            value: U256::decode(buf)?,
            input: Bytes::decode(buf)?,
            access_list: AccessList::decode(buf)?,
            authorizations: Vec::<Authorization>::decode(buf)?,
            y_parity: bool::decode(buf)?,
            r: U256::decode(buf)?,
            s: U256::decode(buf)?,
        })
    }
}

/// A decoded transaction of any of the five supported variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEnvelope {
    /// Legacy, optionally EIP-155 replay-protected.
    Legacy(LegacyTx),
    /// EIP-2930 access-list transaction.
    Eip2930(Eip2930Tx),
    /// EIP-1559 fee-market transaction.
    Eip1559(Eip1559Tx),
    /// EIP-4844 blob transaction.
    Eip4844(Eip4844Tx),
    /// EIP-7702 set-code transaction.
    Eip7702(Eip7702Tx),
}

/// Common accessors shared by every transaction variant.
pub trait Transaction {
    /// The sender-declared nonce.
    fn nonce(&self) -> u64;
    /// The gas limit.
    fn gas_limit(&self) -> u64;
    /// The call target, or `None` for contract creation.
    fn to(&self) -> Option<Address>;
    /// The value transferred, in wei.
    fn value(&self) -> U256;
    /// Calldata (or init code, for contract creation).
    fn input(&self) -> &[u8];
    /// The access list, empty for variants that do not carry one.
    fn access_list(&self) -> &[AccessListItem];
    /// The EIP-7702 authorization list, empty for variants that do not carry one.
    fn authorization_list(&self) -> &[Authorization];
    /// `max_fee_per_blob_gas`, for blob transactions.
    fn max_fee_per_blob_gas(&self) -> Option<u128>;
    /// The blob versioned hashes, for blob transactions.
    fn blob_versioned_hashes(&self) -> &[B256];
    /// `(max_priority_fee_per_gas, max_fee_per_gas)` for fee-market variants, or `(gas_price,
    /// gas_price)` for legacy/2930.
    fn fee_fields(&self) -> (u128, u128);
    /// The EIP-2718 type byte, or `None` for legacy.
    fn tx_type(&self) -> Option<u8>;
    /// The chain id this transaction is bound to, if replay-protected.
    fn chain_id(&self) -> Option<U256>;
    /// The RLP-encoded signing preimage's hash.
    fn signing_hash(&self) -> B256;
    /// `(r, s, y_parity)`.
    fn signature(&self) -> (U256, U256, bool);
    /// Canonical (EIP-2718) wire encoding.
    fn encode_canonical(&self, out: &mut Vec<u8>);
}

impl Transaction for TxEnvelope {
    fn nonce(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.nonce,
            Self::Eip2930(tx) => tx.nonce,
            Self::Eip1559(tx) => tx.nonce,
            Self::Eip4844(tx) => tx.nonce,
            Self::Eip7702(tx) => tx.nonce,
        }
    }

    fn gas_limit(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.gas_limit,
            Self::Eip2930(tx) => tx.gas_limit,
            Self::Eip1559(tx) => tx.gas_limit,
            Self::Eip4844(tx) => tx.gas_limit,
            Self::Eip7702(tx) => tx.gas_limit,
        }
    }

    fn to(&self) -> Option<Address> {
        match self {
            Self::Legacy(tx) => tx.to.to(),
            Self::Eip2930(tx) => tx.to.to(),
            Self::Eip1559(tx) => tx.to.to(),
            Self::Eip4844(tx) => Some(tx.to),
            Self::Eip7702(tx) => Some(tx.to),
        }
    }

    fn value(&self) -> U256 {
        match self {
            Self::Legacy(tx) => tx.value,
            Self::Eip2930(tx) => tx.value,
            Self::Eip1559(tx) => tx.value,
            Self::Eip4844(tx) => tx.value,
            Self::Eip7702(tx) => tx.value,
        }
    }

    fn input(&self) -> &[u8] {
        match self {
            Self::Legacy(tx) => &tx.input,
            Self::Eip2930(tx) => &tx.input,
            Self::Eip1559(tx) => &tx.input,
            Self::Eip4844(tx) => &tx.input,
            Self::Eip7702(tx) => &tx.input,
        }
    }

    fn access_list(&self) -> &[AccessListItem] {
        match self {
            Self::Legacy(_) => &[],
            Self::Eip2930(tx) => &tx.access_list,
            Self::Eip1559(tx) => &tx.access_list,
            Self::Eip4844(tx) => &tx.access_list,
            Self::Eip7702(tx) => &tx.access_list,
        }
    }

    fn authorization_list(&self) -> &[Authorization] {
        match self {
            Self::Eip7702(tx) => &tx.authorizations,
            _ => &[],
        }
    }

    fn max_fee_per_blob_gas(&self) -> Option<u128> {
        match self {
            Self::Eip4844(tx) => Some(tx.max_fee_per_blob_gas),
            _ => None,
        }
    }

    fn blob_versioned_hashes(&self) -> &[B256] {
        match self {
            Self::Eip4844(tx) => &tx.blob_versioned_hashes,
            _ => &[],
        }
    }

    fn fee_fields(&self) -> (u128, u128) {
        match self {
            Self::Legacy(tx) => (tx.gas_price, tx.gas_price),
            Self::Eip2930(tx) => (tx.gas_price, tx.gas_price),
            Self::Eip1559(tx) => (tx.max_priority_fee_per_gas, tx.max_fee_per_gas),
            Self::Eip4844(tx) => (tx.max_priority_fee_per_gas, tx.max_fee_per_gas),
            Self::Eip7702(tx) => (tx.max_priority_fee_per_gas, tx.max_fee_per_gas),
        }
    }

    fn tx_type(&self) -> Option<u8> {
        match self {
            Self::Legacy(_) => None,
            Self::Eip2930(_) => Some(tx_type::EIP2930),
            Self::Eip1559(_) => Some(tx_type::EIP1559),
            Self::Eip4844(_) => Some(tx_type::EIP4844),
            Self::Eip7702(_) => Some(tx_type::EIP7702),
        }
    }

    fn chain_id(&self) -> Option<U256> {
        match self {
            Self::Legacy(tx) => tx.chain_id(),
            Self::Eip2930(tx) => Some(tx.chain_id),
            Self::Eip1559(tx) => Some(tx.chain_id),
            Self::Eip4844(tx) => Some(tx.chain_id),
            Self::Eip7702(tx) => Some(tx.chain_id),
        }
    }

    fn signing_hash(&self) -> B256 {
        match self {
            Self::Legacy(tx) => tx.signing_hash(),
            Self::Eip2930(tx) => tx.signing_hash(),
            Self::Eip1559(tx) => tx.signing_hash(),
            Self::Eip4844(tx) => tx.signing_hash(),
            Self::Eip7702(tx) => tx.signing_hash(),
        }
    }

    fn signature(&self) -> (U256, U256, bool) {
        match self {
            Self::Legacy(tx) => (tx.r, tx.s, tx.y_parity()),
            Self::Eip2930(tx) => (tx.r, tx.s, tx.y_parity),
            Self::Eip1559(tx) => (tx.r, tx.s, tx.y_parity),
            Self::Eip4844(tx) => (tx.r, tx.s, tx.y_parity),
            Self::Eip7702(tx) => (tx.r, tx.s, tx.y_parity),
        }
    }

    fn encode_canonical(&self, out: &mut Vec<u8>) {
        match self {
            Self::Legacy(tx) => tx.encode_payload(out),
            Self::Eip2930(tx) => {
                out.push(tx_type::EIP2930);
                tx.encode_payload(out);
            }
            Self::Eip1559(tx) => {
                out.push(tx_type::EIP1559);
                tx.encode_payload(out);
            }
            Self::Eip4844(tx) => {
                out.push(tx_type::EIP4844);
                tx.encode_payload(out);
            }
            Self::Eip7702(tx) => {
                out.push(tx_type::EIP7702);
                tx.encode_payload(out);
            }
        }
    }
}

impl TxEnvelope {
    /// Decodes a transaction from its canonical (EIP-2718) wire encoding.
    pub fn decode_canonical(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        match buf.first() {
            Some(&byte) if byte >= 0xc0 => Ok(Self::Legacy(LegacyTx::decode_payload(buf)?)),
            Some(&tx_type::EIP2930) => {
                *buf = &buf[1..];
                Ok(Self::Eip2930(Eip2930Tx::decode_payload(buf)?))
            }
            Some(&tx_type::EIP1559) => {
                *buf = &buf[1..];
                Ok(Self::Eip1559(Eip1559Tx::decode_payload(buf)?))
            }
            Some(&tx_type::EIP4844) => {
                *buf = &buf[1..];
                Ok(Self::Eip4844(Eip4844Tx::decode_payload(buf)?))
            }
            Some(&tx_type::EIP7702) => {
                *buf = &buf[1..];
                Ok(Self::Eip7702(Eip7702Tx::decode_payload(buf)?))
            }
            Some(_) => Err(alloy_rlp::Error::Custom("unsupported transaction type")),
            None => Err(alloy_rlp::Error::InputTooShort),
        }
    }

    /// `keccak256(encode_canonical(self))`.
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::new();
        self.encode_canonical(&mut buf);
        keccak256(buf)
    }

    /// Recovers the sender via secp256k1 signature recovery over [`Transaction::signing_hash`].
    pub fn recover_sender(&self) -> Result<Address, SignatureValidityError> {
        let (r, s, y_parity) = self.signature();
        check_signature_bounds(r, s)?;
        let signature = Signature::new(r, s, y_parity);
        signature
            .recover_address_from_prehash(&self.signing_hash())
            .map_err(|_| SignatureValidityError::RecoveryFailed)
    }
}

/// A transaction whose sender has already been recovered and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredTransaction {
    /// The decoded transaction.
    pub envelope: TxEnvelope,
    /// The recovered sender.
    pub sender: Address,
    /// `keccak256` of the canonical encoding.
    pub hash: B256,
}

impl RecoveredTransaction {
    /// Decodes and recovers a transaction's sender in one step.
    pub fn decode_and_recover(raw: &[u8]) -> Result<Self, TxDecodeError> {
        let mut buf = raw;
        let envelope = TxEnvelope::decode_canonical(&mut buf).map_err(TxDecodeError::Rlp)?;
        let sender = envelope.recover_sender().map_err(TxDecodeError::Signature)?;
        Ok(Self { hash: envelope.hash(), envelope, sender })
    }
}

/// Failure modes when decoding and validating a raw transaction.
#[derive(thiserror::Error, Debug)]
pub enum TxDecodeError {
    /// The bytes are not valid RLP / EIP-2718 for any supported transaction type.
    #[error("failed to decode transaction: {0}")]
    Rlp(alloy_rlp::Error),
    /// The signature failed to recover a sender address.
    #[error("invalid transaction signature: {0}")]
    Signature(SignatureValidityError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    #[test]
    fn tx_kind_round_trips() {
        let create = TxKind::Create;
        let mut buf = Vec::new();
        create.encode(&mut buf);
        let decoded = TxKind::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, TxKind::Create);

        let call = TxKind::Call(address!("0000000000000000000000000000000000dead"));
        let mut buf = Vec::new();
        call.encode(&mut buf);
        let decoded = TxKind::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, call);
    }

    #[test]
    fn delegation_designator_round_trips() {
        let target = address!("0000000000000000000000000000000000beef");
        let designator = delegation_designator(target);
        assert_eq!(designator.len(), DELEGATION_DESIGNATOR_LEN);
        assert_eq!(resolve_delegation(&designator), Some(target));
    }

    #[test]
    fn non_designator_code_does_not_resolve() {
        assert_eq!(resolve_delegation(&[0x60, 0x00]), None);
    }

    #[test]
    fn eip155_legacy_chain_id_round_trips() {
        let tx = LegacyTx {
            nonce: 0,
            gas_price: 1,
            gas_limit: 21_000,
            to: TxKind::Call(address!("0000000000000000000000000000000000dead")),
            value: U256::ZERO,
            input: Bytes::new(),
            v: 37,
            r: U256::from(1u64),
            s: U256::from(1u64),
        };
        assert_eq!(tx.chain_id(), Some(U256::from(1u64)));
    }

    #[test]
    fn eip1559_canonical_encoding_round_trips() {
        let tx = TxEnvelope::Eip1559(Eip1559Tx {
            chain_id: U256::from(1u64),
            nonce: 4,
            max_priority_fee_per_gas: 1_000_000_000,
            max_fee_per_gas: 30_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(address!("0000000000000000000000000000000000dead")),
            value: U256::from(1u64),
            input: Bytes::new(),
            access_list: vec![AccessListItem {
                address: address!("0000000000000000000000000000000000beef"),
                storage_keys: vec![B256::ZERO],
            }],
            y_parity: true,
            r: U256::from(11u64),
            s: U256::from(22u64),
        });
        let mut buf = Vec::new();
        tx.encode_canonical(&mut buf);
        assert_eq!(buf[0], tx_type::EIP1559);
        let decoded = TxEnvelope::decode_canonical(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn legacy_canonical_encoding_round_trips() {
        let tx = TxEnvelope::Legacy(LegacyTx {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(address!("0000000000000000000000000000000000dead")),
            value: U256::from(1_000_000_000_000_000_000u128),
            input: Bytes::new(),
            v: 37,
            r: U256::from(1u64),
            s: U256::from(1u64),
        });
        let mut buf = Vec::new();
        tx.encode_canonical(&mut buf);
        let decoded = TxEnvelope::decode_canonical(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn authorization_signing_hash_is_stable() {
        let auth = Authorization {
            chain_id: U256::from(1u64),
            address: address!("0000000000000000000000000000000000dead"),
            nonce: 0,
            y_parity: 0,
            r: U256::from(1u64),
            s: U256::from(1u64),
        };
        let hash1 = auth.signing_hash();
        let hash2 = auth.signing_hash();
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, b256!("0000000000000000000000000000000000000000000000000000000000000000"));
    }

    #[test]
    fn signature_bounds_reject_zero_r_and_s() {
        assert_eq!(check_signature_bounds(U256::ZERO, U256::from(1u64)), Err(SignatureValidityError::InvalidR));
        assert_eq!(check_signature_bounds(U256::from(1u64), U256::ZERO), Err(SignatureValidityError::InvalidS));
    }

    #[test]
    fn signature_bounds_reject_high_s() {
        let high_s = (SECP256K1N >> 1) + U256::from(1u64);
        assert_eq!(check_signature_bounds(U256::from(1u64), high_s), Err(SignatureValidityError::InvalidS));
        assert!(check_signature_bounds(U256::from(1u64), SECP256K1N >> 1).is_ok());
    }

    #[test]
    fn signature_bounds_reject_r_at_or_above_curve_order() {
        assert_eq!(check_signature_bounds(SECP256K1N, U256::from(1u64)), Err(SignatureValidityError::InvalidR));
    }
}
