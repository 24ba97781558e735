//! Decoders for the protobuf payloads a transaction returns. Each message's
//! response is decoded with the schema of the message that produced it.
use adamant_addresses::{validate_address, ADDRESS_PREFIX};
use prost::Message;

use crate::chain::{ChainError, TransactionResult};

#[derive(Clone, PartialEq, Message)]
pub struct MsgInstantiateContractResponse {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgExecuteContractResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgData {
    #[prost(string, tag = "1")]
    pub msg_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

/// The `data` field of a committed transaction. Older chains fill `data`,
/// newer ones fill `msg_responses`.
#[derive(Clone, PartialEq, Message)]
pub struct TxMsgData {
    #[prost(message, repeated, tag = "1")]
    pub data: Vec<MsgData>,
    #[prost(message, repeated, tag = "2")]
    pub msg_responses: Vec<Any>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseSchema {
    InstantiateContract,
    ExecuteContract,
}

impl ResponseSchema {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseSchema::InstantiateContract => "MsgInstantiateContractResponse",
            ResponseSchema::ExecuteContract => "MsgExecuteContractResponse",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedResponse {
    Instantiated { address: String, data: Vec<u8> },
    Executed { data: Vec<u8> },
}

/// Splits a transaction's `data` into the responses of its messages.
pub fn decode_tx_msg_data(bytes: &[u8]) -> Result<Vec<Vec<u8>>, ChainError> {
    let tx_msg_data =
        TxMsgData::decode(bytes).map_err(|e| ChainError::decode("TxMsgData", e))?;
    if !tx_msg_data.msg_responses.is_empty() {
        Ok(tx_msg_data
            .msg_responses
            .into_iter()
            .map(|any| any.value)
            .collect())
    } else {
        Ok(tx_msg_data.data.into_iter().map(|d| d.data).collect())
    }
}

/// Decodes the response of the message at `index` with the given schema.
pub fn decode_response(
    result: &TransactionResult,
    index: usize,
    schema: ResponseSchema,
) -> Result<DecodedResponse, ChainError> {
    let bytes = result.responses.get(index).ok_or_else(|| {
        ChainError::decode(
            schema.name(),
            format!(
                "transaction {} has no response at index {} ({} responses)",
                result.txhash,
                index,
                result.responses.len()
            ),
        )
    })?;
    match schema {
        ResponseSchema::InstantiateContract => {
            let response = MsgInstantiateContractResponse::decode(bytes.as_slice())
                .map_err(|e| ChainError::decode(schema.name(), e))?;
            validate_address(&response.address, ADDRESS_PREFIX)
                .map_err(|e| ChainError::decode(schema.name(), e))?;
            Ok(DecodedResponse::Instantiated {
                address: response.address,
                data: response.data,
            })
        }
        ResponseSchema::ExecuteContract => {
            let response = MsgExecuteContractResponse::decode(bytes.as_slice())
                .map_err(|e| ChainError::decode(schema.name(), e))?;
            Ok(DecodedResponse::Executed {
                data: response.data,
            })
        }
    }
}

/// Gets the address of the contract instantiated by the message at `index`.
pub fn decode_instantiated_address(
    result: &TransactionResult,
    index: usize,
) -> Result<String, ChainError> {
    match decode_response(result, index, ResponseSchema::InstantiateContract)? {
        DecodedResponse::Instantiated { address, .. } => Ok(address),
        DecodedResponse::Executed { .. } => Err(ChainError::decode(
            ResponseSchema::InstantiateContract.name(),
            "decoded an execute response",
        )),
    }
}
