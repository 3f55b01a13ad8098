//! Bus framing for the deployment protocol.
//!
//! A [`Frame`] pairs a [`Topic`] with an encoded payload. Messages know their
//! own topic through [`WireMessage`]; the controller and master sides use
//! [`ControllerRequest`] and [`ControllerResponse`] to dispatch on it.

pub mod messages;

use std::fmt;
use std::str::FromStr;

use crate::deployment::{
    ContainerResourceDeploymentCommitRequest, ContainerResourceDeploymentCommitResponse,
    ContainerResourceDeploymentQueryRequest, ContainerResourceDeploymentQueryResponse,
    LiveActivityDeploymentRequest, LiveActivityDeploymentResponse,
};
use crate::error::WireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ResourceQueryRequest,
    ResourceQueryResponse,
    ResourceCommitRequest,
    ResourceCommitResponse,
    ActivityDeployRequest,
    ActivityDeployResponse,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Self::ResourceQueryRequest,
        Self::ResourceQueryResponse,
        Self::ResourceCommitRequest,
        Self::ResourceCommitResponse,
        Self::ActivityDeployRequest,
        Self::ActivityDeployResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResourceQueryRequest => "resource/query/request",
            Self::ResourceQueryResponse => "resource/query/response",
            Self::ResourceCommitRequest => "resource/commit/request",
            Self::ResourceCommitResponse => "resource/commit/response",
            Self::ActivityDeployRequest => "activity/deploy/request",
            Self::ActivityDeployResponse => "activity/deploy/response",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| WireError::UnknownTopic(s.to_string()))
    }
}

/// One message on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: Topic,
    pub payload: Vec<u8>,
}

/// A message with a fixed topic and a JSON encoding.
pub trait WireMessage: Sized {
    const TOPIC: Topic;

    fn encode(&self) -> Result<Vec<u8>, WireError>;

    fn decode(bytes: &[u8]) -> Result<Self, WireError>;

    fn to_frame(&self) -> Result<Frame, WireError> {
        Ok(Frame {
            topic: Self::TOPIC,
            payload: self.encode()?,
        })
    }
}

/// Messages a controller accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerRequest {
    Query(ContainerResourceDeploymentQueryRequest),
    Commit(ContainerResourceDeploymentCommitRequest),
    DeployActivity(LiveActivityDeploymentRequest),
}

impl ControllerRequest {
    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        match frame.topic {
            Topic::ResourceQueryRequest => Ok(Self::Query(
                ContainerResourceDeploymentQueryRequest::decode(&frame.payload)?,
            )),
            Topic::ResourceCommitRequest => Ok(Self::Commit(
                ContainerResourceDeploymentCommitRequest::decode(&frame.payload)?,
            )),
            Topic::ActivityDeployRequest => Ok(Self::DeployActivity(
                LiveActivityDeploymentRequest::decode(&frame.payload)?,
            )),
            other => Err(WireError::UnknownTopic(other.to_string())),
        }
    }

    pub fn to_frame(&self) -> Result<Frame, WireError> {
        match self {
            Self::Query(request) => request.to_frame(),
            Self::Commit(request) => request.to_frame(),
            Self::DeployActivity(request) => request.to_frame(),
        }
    }
}

/// Messages a controller sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerResponse {
    Query(ContainerResourceDeploymentQueryResponse),
    Commit(ContainerResourceDeploymentCommitResponse),
    DeployActivity(LiveActivityDeploymentResponse),
}

impl ControllerResponse {
    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        match frame.topic {
            Topic::ResourceQueryResponse => Ok(Self::Query(
                ContainerResourceDeploymentQueryResponse::decode(&frame.payload)?,
            )),
            Topic::ResourceCommitResponse => Ok(Self::Commit(
                ContainerResourceDeploymentCommitResponse::decode(&frame.payload)?,
            )),
            Topic::ActivityDeployResponse => Ok(Self::DeployActivity(
                LiveActivityDeploymentResponse::decode(&frame.payload)?,
            )),
            other => Err(WireError::UnknownTopic(other.to_string())),
        }
    }

    pub fn to_frame(&self) -> Result<Frame, WireError> {
        match self {
            Self::Query(response) => response.to_frame(),
            Self::Commit(response) => response.to_frame(),
            Self::DeployActivity(response) => response.to_frame(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::TransactionId;

    #[test]
    fn test_topic_names_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
        assert!(matches!(
            "resource/delete".parse::<Topic>(),
            Err(WireError::UnknownTopic(_))
        ));
    }

    #[test]
    fn test_request_frame_dispatch() {
        let request = ControllerRequest::Query(ContainerResourceDeploymentQueryRequest::new(
            TransactionId(4),
        ));
        let frame = request.to_frame().unwrap();
        assert_eq!(frame.topic, Topic::ResourceQueryRequest);
        assert_eq!(ControllerRequest::from_frame(&frame).unwrap(), request);
    }

    #[test]
    fn test_response_topic_is_not_a_request() {
        let frame = ContainerResourceDeploymentCommitResponse::success(TransactionId(1))
            .to_frame()
            .unwrap();
        assert!(ControllerRequest::from_frame(&frame).is_err());
        assert!(ControllerResponse::from_frame(&frame).is_ok());
    }
}
