//! ABI decoding of raw logs into name-addressable event payloads.
//!
//! # Responsibilities
//! - Build a per-event decoder from the contract ABI at registration time
//! - Split indexed arguments (topics) from the data segment
//! - Decode every argument in declared order, keyed by argument name
//!
//! # Design Decisions
//! - Decoders are constructed once when a route is registered, so malformed
//!   ABIs and unsupported argument types fail at startup instead of at the
//!   first matching log
//! - Only value-typed indexed arguments (address, uint, int, bool, fixed
//!   bytes) are accepted; dynamic indexed types (string, bytes, arrays) are
//!   hashed into their topic and cannot be recovered

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_json_abi::Event;
use thiserror::Error;

/// Errors raised while building a decoder or decoding a log.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The ABI declares a type the dynamic decoder cannot parse.
    #[error("invalid ABI type '{ty}' for argument '{argument}': {message}")]
    InvalidType {
        argument: String,
        ty: String,
        message: String,
    },

    /// An indexed argument uses a type whose value is hashed into the topic.
    #[error("indexed argument '{argument}' has unsupported type '{ty}' (dynamic indexed values are hashed into their topic)")]
    UnsupportedIndexedType { argument: String, ty: String },

    /// The log carries fewer topics than the event declares.
    #[error("log is missing the topic for indexed argument '{argument}'")]
    MissingTopic { argument: String },

    /// The data segment does not match the declared non-indexed arguments.
    #[error("failed to decode log payload: {0}")]
    Payload(String),
}

/// One declared event argument.
#[derive(Debug, Clone)]
struct EventParam {
    name: String,
    ty: DynSolType,
    indexed: bool,
}

/// Decoder for a single event signature.
///
/// Holds the parsed argument types in declared order so decoded fields come
/// out in the same order the contract declares them.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    event: String,
    topic0: B256,
    params: Vec<EventParam>,
}

impl EventDecoder {
    /// Build a decoder from an ABI event definition.
    ///
    /// Fails if any argument type cannot be parsed or an indexed argument
    /// uses a type that is hashed into its topic.
    pub fn from_abi(event: &Event) -> Result<Self, DecodeError> {
        let mut params = Vec::with_capacity(event.inputs.len());

        for input in &event.inputs {
            let ty: DynSolType = input.ty.parse().map_err(|e| DecodeError::InvalidType {
                argument: input.name.clone(),
                ty: input.ty.clone(),
                message: format!("{e}"),
            })?;

            if input.indexed && !indexed_type_supported(&ty) {
                return Err(DecodeError::UnsupportedIndexedType {
                    argument: input.name.clone(),
                    ty: input.ty.clone(),
                });
            }

            params.push(EventParam {
                name: input.name.clone(),
                ty,
                indexed: input.indexed,
            });
        }

        Ok(Self {
            event: event.name.clone(),
            topic0: event.selector(),
            params,
        })
    }

    /// The event name this decoder was built for.
    pub fn event_name(&self) -> &str {
        &self.event
    }

    /// keccak256 of the canonical event signature.
    pub fn topic0(&self) -> B256 {
        self.topic0
    }

    /// Decode a raw log into named fields.
    ///
    /// Indexed arguments are read from topics 1..N, non-indexed arguments
    /// from the data segment, and the results are merged back into the
    /// declared argument order.
    pub fn decode(&self, log: &Log) -> Result<DecodedEvent, DecodeError> {
        let topics = log.topics();

        // Decode the data segment as a tuple of the non-indexed types
        let body_types: Vec<DynSolType> = self
            .params
            .iter()
            .filter(|p| !p.indexed)
            .map(|p| p.ty.clone())
            .collect();

        let body_values: Vec<DynSolValue> = if body_types.is_empty() {
            Vec::new()
        } else {
            // The data segment is encoded like a parameter list, not a
            // single nested tuple.
            let tuple = DynSolType::Tuple(body_types);
            match tuple
                .abi_decode_sequence(log.data().data.as_ref())
                .map_err(|e| DecodeError::Payload(format!("{e}")))?
            {
                DynSolValue::Tuple(values) => values,
                other => vec![other],
            }
        };

        let mut body = body_values.into_iter();
        let mut topic_index = 1usize;
        let mut fields = Vec::with_capacity(self.params.len());

        for param in &self.params {
            let value = if param.indexed {
                let topic = topics.get(topic_index).ok_or_else(|| DecodeError::MissingTopic {
                    argument: param.name.clone(),
                })?;
                topic_index += 1;
                param
                    .ty
                    .abi_decode(topic.as_slice())
                    .map_err(|e| DecodeError::Payload(format!("{e}")))?
            } else {
                body.next().ok_or_else(|| {
                    DecodeError::Payload(format!(
                        "data segment ended before argument '{}'",
                        param.name
                    ))
                })?
            };

            fields.push((param.name.clone(), value));
        }

        Ok(DecodedEvent { fields })
    }
}

/// Whether an indexed argument of this type is stored by value in its topic.
fn indexed_type_supported(ty: &DynSolType) -> bool {
    matches!(
        ty,
        DynSolType::Address
            | DynSolType::Uint(_)
            | DynSolType::Int(_)
            | DynSolType::Bool
            | DynSolType::FixedBytes(_)
    )
}

/// A decoded event: argument values keyed by name, in declared order.
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    fields: Vec<(String, DynSolValue)>,
}

impl DecodedEvent {
    /// Look up a decoded argument by name.
    pub fn get(&self, name: &str) -> Option<&DynSolValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Look up an address argument by name.
    pub fn address(&self, name: &str) -> Option<Address> {
        match self.get(name) {
            Some(DynSolValue::Address(addr)) => Some(*addr),
            _ => None,
        }
    }

    /// Look up an unsigned integer argument by name.
    pub fn uint(&self, name: &str) -> Option<U256> {
        match self.get(name) {
            Some(DynSolValue::Uint(value, _)) => Some(*value),
            _ => None,
        }
    }

    /// All decoded arguments in declared order.
    pub fn fields(&self) -> &[(String, DynSolValue)] {
        &self.fields
    }

    /// Number of decoded arguments.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the event has no arguments.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
