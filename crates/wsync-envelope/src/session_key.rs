//! Session keys binding an agent to a project channel
//!
//! Format: `agent:{agent_id}:officeclaw:channel:{project_id}`

use crate::error::SessionKeyError;
use once_cell::sync::Lazy;
use regex::Regex;

const NAMESPACE: &str = "officeclaw";
const CHANNEL: &str = "channel";

static AGENT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^agent_[a-z][a-z0-9]*(?:_[a-z0-9]+)*$").expect("agent id pattern"));
static PROJECT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^proj_[a-z][a-z0-9]*(?:_[a-z0-9]+)*$").expect("project id pattern"));

/// Parsed session key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub agent_id: String,
    pub project_id: String,
}

/// Check an agent id against the id grammar
pub fn validate_agent_id(agent_id: &str) -> Result<(), SessionKeyError> {
    if agent_id.is_empty() {
        return Err(SessionKeyError::Empty("agentId"));
    }
    if !AGENT_ID.is_match(agent_id) {
        return Err(SessionKeyError::InvalidAgentId(agent_id.to_string()));
    }
    Ok(())
}

/// Check a project id against the id grammar
pub fn validate_project_id(project_id: &str) -> Result<(), SessionKeyError> {
    if project_id.is_empty() {
        return Err(SessionKeyError::Empty("projectId"));
    }
    if !PROJECT_ID.is_match(project_id) {
        return Err(SessionKeyError::InvalidProjectId(project_id.to_string()));
    }
    Ok(())
}

/// Build the session key for an agent/project pair
pub fn build_session_key(agent_id: &str, project_id: &str) -> Result<String, SessionKeyError> {
    validate_agent_id(agent_id)?;
    validate_project_id(project_id)?;
    Ok(format!("agent:{agent_id}:{NAMESPACE}:{CHANNEL}:{project_id}"))
}

/// Split a session key back into its ids
pub fn parse_session_key(key: &str) -> Result<SessionKey, SessionKeyError> {
    if key.is_empty() {
        return Err(SessionKeyError::Empty("sessionKey"));
    }
    let parts: Vec<&str> = key.split(':').collect();
    let [prefix, agent_id, namespace, channel, project_id] = parts.as_slice() else {
        return Err(SessionKeyError::SegmentCount(key.to_string()));
    };
    if *prefix != "agent" || *namespace != NAMESPACE || *channel != CHANNEL {
        return Err(SessionKeyError::Namespace(key.to_string()));
    }
    validate_agent_id(agent_id)?;
    validate_project_id(project_id)?;
    Ok(SessionKey {
        agent_id: (*agent_id).to_string(),
        project_id: (*project_id).to_string(),
    })
}

/// Check if `key` is a well-formed session key
#[must_use]
pub fn is_session_key(key: &str) -> bool {
    parse_session_key(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_key() {
        assert_eq!(
            build_session_key("agent_bd", "proj_alpha").unwrap(),
            "agent:agent_bd:officeclaw:channel:proj_alpha"
        );
    }

    #[test]
    fn rejects_bad_agent_id() {
        let err = build_session_key("Agent-BD", "proj_alpha").unwrap_err();
        assert_eq!(err.to_string(), "Invalid agentId format: Agent-BD");
    }

    #[test]
    fn rejects_bad_project_id() {
        assert!(matches!(
            build_session_key("agent_bd", "project_alpha"),
            Err(SessionKeyError::InvalidProjectId(_))
        ));
    }

    #[test]
    fn parse_requires_five_segments() {
        assert!(matches!(
            parse_session_key("agent:agent_bd:officeclaw:proj_alpha"),
            Err(SessionKeyError::SegmentCount(_))
        ));
    }

    #[test]
    fn parse_requires_namespace() {
        assert!(matches!(
            parse_session_key("agent:agent_bd:otherapp:channel:proj_alpha"),
            Err(SessionKeyError::Namespace(_))
        ));
    }

    #[test]
    fn parse_inverts_build() {
        let key = build_session_key("agent_research_2", "proj_q3_launch").unwrap();
        let parsed = parse_session_key(&key).unwrap();
        assert_eq!(parsed.agent_id, "agent_research_2");
        assert_eq!(parsed.project_id, "proj_q3_launch");
        assert!(is_session_key(&key));
        assert!(!is_session_key("agent_bd"));
    }
}
