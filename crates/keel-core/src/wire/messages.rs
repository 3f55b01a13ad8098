//! JSON field layout and integer codes of the deployment messages.
//!
//! Absent optional strings (`detail`, `signature`) travel as `""`; decoding
//! maps `""` back to `None`. Unknown integer codes are decode errors.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Topic, WireMessage};
use crate::deployment::{
    ActivityDeployStatus, ContainerResourceDeploymentCommitRequest,
    ContainerResourceDeploymentCommitResponse, ContainerResourceDeploymentCommitStatus,
    ContainerResourceDeploymentItem, ContainerResourceDeploymentQueryRequest,
    ContainerResourceDeploymentQueryResponse, ContainerResourceLocation,
    LiveActivityDeploymentRequest, LiveActivityDeploymentResponse, QueryResponseStatus,
    TransactionId,
};
use crate::error::WireError;
use crate::fs::ContentSignature;
use crate::resource::ResourceDependency;
use crate::version::{Version, VersionRange};

impl QueryResponseStatus {
    pub const SPECIFIC_QUERY_SATISFIED: i32 = 0;
    pub const SPECIFIC_QUERY_NOT_SATISFIED: i32 = 1;
    pub const GENERAL_QUERY_RESPONSE: i32 = 2;

    pub fn code(self) -> i32 {
        match self {
            Self::SpecificQuerySatisfied => Self::SPECIFIC_QUERY_SATISFIED,
            Self::SpecificQueryNotSatisfied => Self::SPECIFIC_QUERY_NOT_SATISFIED,
            Self::GeneralQueryResponse => Self::GENERAL_QUERY_RESPONSE,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, WireError> {
        match code {
            Self::SPECIFIC_QUERY_SATISFIED => Ok(Self::SpecificQuerySatisfied),
            Self::SPECIFIC_QUERY_NOT_SATISFIED => Ok(Self::SpecificQueryNotSatisfied),
            Self::GENERAL_QUERY_RESPONSE => Ok(Self::GeneralQueryResponse),
            _ => Err(WireError::UnknownStatus {
                message: "query response",
                code,
            }),
        }
    }
}

impl ContainerResourceDeploymentCommitStatus {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;

    pub fn code(self) -> i32 {
        match self {
            Self::Success => Self::SUCCESS,
            Self::Failure => Self::FAILURE,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, WireError> {
        match code {
            Self::SUCCESS => Ok(Self::Success),
            Self::FAILURE => Ok(Self::Failure),
            _ => Err(WireError::UnknownStatus {
                message: "commit response",
                code,
            }),
        }
    }
}

impl ActivityDeployStatus {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE_COPY: i32 = 1;
    pub const FAILURE_UNPACK: i32 = 2;

    pub fn code(self) -> i32 {
        match self {
            Self::Success => Self::SUCCESS,
            Self::FailureCopy => Self::FAILURE_COPY,
            Self::FailureUnpack => Self::FAILURE_UNPACK,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, WireError> {
        match code {
            Self::SUCCESS => Ok(Self::Success),
            Self::FAILURE_COPY => Ok(Self::FailureCopy),
            Self::FAILURE_UNPACK => Ok(Self::FailureUnpack),
            _ => Err(WireError::UnknownStatus {
                message: "live activity deployment response",
                code,
            }),
        }
    }
}

impl ContainerResourceLocation {
    pub fn code(self) -> i32 {
        match self {
            Self::SystemBootstrap => 0,
            Self::UserBootstrap => 1,
            Self::Config => 2,
            Self::LibSystem => 3,
            Self::Root => 4,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, WireError> {
        Self::ALL
            .into_iter()
            .find(|location| location.code() == code)
            .ok_or(WireError::UnknownLocation(code))
    }
}

fn to_sentinel(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn from_sentinel(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn to_json<W: Serialize>(message: &'static str, wire: &W) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(wire).map_err(|source| WireError::Encode { message, source })
}

fn from_json<W: DeserializeOwned>(message: &'static str, bytes: &[u8]) -> Result<W, WireError> {
    serde_json::from_slice(bytes).map_err(|source| WireError::Malformed { message, source })
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequestWire {
    transaction_id: i64,
    items: Vec<QueryItemWire>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryItemWire {
    name: String,
    version_range: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponseWire {
    transaction_id: i64,
    status: i32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitRequestWire {
    transaction_id: i64,
    items: Vec<CommitItemWire>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitItemWire {
    name: String,
    version: String,
    signature: String,
    location_uri: String,
    location: i32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponseWire {
    transaction_id: i64,
    status: i32,
    detail: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityDeployRequestWire {
    transaction_id: i64,
    uuid: String,
    identifying_name: String,
    version: String,
    activity_source_uri: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityDeployResponseWire {
    transaction_id: i64,
    uuid: String,
    status: i32,
    detail: String,
    time_deployed: i64,
}

impl WireMessage for ContainerResourceDeploymentQueryRequest {
    const TOPIC: Topic = Topic::ResourceQueryRequest;

    fn encode(&self) -> Result<Vec<u8>, WireError> {
        let wire = QueryRequestWire {
            transaction_id: self.transaction_id.0,
            items: self
                .queries
                .iter()
                .map(|query| QueryItemWire {
                    name: query.name.clone(),
                    version_range: query.version_range.to_string(),
                })
                .collect(),
        };
        to_json("query request", &wire)
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let wire: QueryRequestWire = from_json("query request", bytes)?;
        let queries = wire
            .items
            .into_iter()
            .map(|item| -> Result<_, WireError> {
                Ok(ResourceDependency::new(
                    item.name,
                    VersionRange::parse(&item.version_range)?,
                ))
            })
            .collect::<Result<Vec<_>, WireError>>()?;
        Ok(Self {
            transaction_id: TransactionId(wire.transaction_id),
            queries,
        })
    }
}

impl WireMessage for ContainerResourceDeploymentQueryResponse {
    const TOPIC: Topic = Topic::ResourceQueryResponse;

    fn encode(&self) -> Result<Vec<u8>, WireError> {
        to_json(
            "query response",
            &QueryResponseWire {
                transaction_id: self.transaction_id.0,
                status: self.status.code(),
            },
        )
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let wire: QueryResponseWire = from_json("query response", bytes)?;
        Ok(Self {
            transaction_id: TransactionId(wire.transaction_id),
            status: QueryResponseStatus::from_code(wire.status)?,
        })
    }
}

impl WireMessage for ContainerResourceDeploymentCommitRequest {
    const TOPIC: Topic = Topic::ResourceCommitRequest;

    fn encode(&self) -> Result<Vec<u8>, WireError> {
        let wire = CommitRequestWire {
            transaction_id: self.transaction_id.0,
            items: self
                .items
                .iter()
                .map(|item| CommitItemWire {
                    name: item.name.clone(),
                    version: item.version.to_string(),
                    signature: to_sentinel(item.signature.as_ref().map(ContentSignature::as_str)),
                    location_uri: item.source_uri.clone(),
                    location: item.location.code(),
                })
                .collect(),
        };
        to_json("commit request", &wire)
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let wire: CommitRequestWire = from_json("commit request", bytes)?;
        let items = wire
            .items
            .into_iter()
            .map(|item| -> Result<_, WireError> {
                Ok(ContainerResourceDeploymentItem {
                    version: Version::parse(&item.version)?,
                    location: ContainerResourceLocation::from_code(item.location)?,
                    signature: from_sentinel(item.signature).map(ContentSignature::from_hex),
                    source_uri: item.location_uri,
                    name: item.name,
                })
            })
            .collect::<Result<Vec<_>, WireError>>()?;
        Ok(Self {
            transaction_id: TransactionId(wire.transaction_id),
            items,
        })
    }
}

impl WireMessage for ContainerResourceDeploymentCommitResponse {
    const TOPIC: Topic = Topic::ResourceCommitResponse;

    fn encode(&self) -> Result<Vec<u8>, WireError> {
        to_json(
            "commit response",
            &CommitResponseWire {
                transaction_id: self.transaction_id.0,
                status: self.status.code(),
                detail: to_sentinel(self.detail.as_deref()),
            },
        )
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let wire: CommitResponseWire = from_json("commit response", bytes)?;
        Ok(Self {
            transaction_id: TransactionId(wire.transaction_id),
            status: ContainerResourceDeploymentCommitStatus::from_code(wire.status)?,
            detail: from_sentinel(wire.detail),
        })
    }
}

impl WireMessage for LiveActivityDeploymentRequest {
    const TOPIC: Topic = Topic::ActivityDeployRequest;

    fn encode(&self) -> Result<Vec<u8>, WireError> {
        to_json(
            "live activity deployment request",
            &ActivityDeployRequestWire {
                transaction_id: self.transaction_id.0,
                uuid: self.uuid.clone(),
                identifying_name: self.identifying_name.clone(),
                version: self.version.to_string(),
                activity_source_uri: self.activity_source_uri.clone(),
            },
        )
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let wire: ActivityDeployRequestWire = from_json("live activity deployment request", bytes)?;
        Ok(Self {
            transaction_id: TransactionId(wire.transaction_id),
            uuid: wire.uuid,
            identifying_name: wire.identifying_name,
            version: Version::parse(&wire.version)?,
            activity_source_uri: wire.activity_source_uri,
        })
    }
}

impl WireMessage for LiveActivityDeploymentResponse {
    const TOPIC: Topic = Topic::ActivityDeployResponse;

    fn encode(&self) -> Result<Vec<u8>, WireError> {
        to_json(
            "live activity deployment response",
            &ActivityDeployResponseWire {
                transaction_id: self.transaction_id.0,
                uuid: self.uuid.clone(),
                status: self.status.code(),
                detail: to_sentinel(self.detail.as_deref()),
                time_deployed: self.time_deployed,
            },
        )
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let wire: ActivityDeployResponseWire =
            from_json("live activity deployment response", bytes)?;
        Ok(Self {
            transaction_id: TransactionId(wire.transaction_id),
            uuid: wire.uuid,
            status: ActivityDeployStatus::from_code(wire.status)?,
            detail: from_sentinel(wire.detail),
            time_deployed: wire.time_deployed,
        })
    }
}
