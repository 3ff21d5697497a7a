//! UWS job phases.
//!
//! `GET {job}/phase` answers with the bare phase name; some services return
//! the full job document instead, so `<uws:phase>` is accepted as well.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt;
use std::str::FromStr;

use crate::error::{TapError, TapResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Pending,
    Queued,
    Executing,
    Completed,
    Error,
    Aborted,
    Unknown,
    Held,
    Suspended,
    Archived,
}

impl ExecutionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Pending => "PENDING",
            ExecutionPhase::Queued => "QUEUED",
            ExecutionPhase::Executing => "EXECUTING",
            ExecutionPhase::Completed => "COMPLETED",
            ExecutionPhase::Error => "ERROR",
            ExecutionPhase::Aborted => "ABORTED",
            ExecutionPhase::Unknown => "UNKNOWN",
            ExecutionPhase::Held => "HELD",
            ExecutionPhase::Suspended => "SUSPENDED",
            ExecutionPhase::Archived => "ARCHIVED",
        }
    }

    /// The job will not change phase on its own any more.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionPhase::Completed
                | ExecutionPhase::Error
                | ExecutionPhase::Aborted
                | ExecutionPhase::Archived
        )
    }

    /// Parse a phase response body, plain text or XML job document.
    pub fn from_response(body: &str) -> TapResult<Self> {
        let trimmed = body.trim();
        if trimmed.starts_with('<') {
            phase_from_xml(trimmed)?.parse()
        } else {
            trimmed.parse()
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionPhase {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => ExecutionPhase::Pending,
            "QUEUED" => ExecutionPhase::Queued,
            "EXECUTING" => ExecutionPhase::Executing,
            "COMPLETED" => ExecutionPhase::Completed,
            "ERROR" => ExecutionPhase::Error,
            "ABORTED" => ExecutionPhase::Aborted,
            "UNKNOWN" => ExecutionPhase::Unknown,
            "HELD" => ExecutionPhase::Held,
            "SUSPENDED" => ExecutionPhase::Suspended,
            "ARCHIVED" => ExecutionPhase::Archived,
            other => {
                return Err(TapError::format(
                    "UWS phase",
                    format!("unknown phase '{}'", other),
                ))
            }
        })
    }
}

fn phase_from_xml(xml: &str) -> TapResult<String> {
    let mut reader = Reader::from_str(xml);
    let mut in_phase = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"phase" => in_phase = true,
            Ok(Event::Text(e)) if in_phase => {
                return e
                    .unescape()
                    .map(|t| t.trim().to_string())
                    .map_err(|e| TapError::format("UWS job", e.to_string()));
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"phase" => in_phase = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(TapError::format("UWS job", e.to_string())),
            _ => {}
        }
    }
    Err(TapError::format("UWS job", "no phase element"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_phase() {
        assert_eq!(
            ExecutionPhase::from_response("EXECUTING\n").unwrap(),
            ExecutionPhase::Executing
        );
        assert_eq!(
            ExecutionPhase::from_response("completed").unwrap(),
            ExecutionPhase::Completed
        );
    }

    #[test]
    fn test_job_document_phase() {
        let doc = r#"<?xml version="1.0"?>
            <uws:job xmlns:uws="http://www.ivoa.net/xml/UWS/v1.0">
              <uws:jobId>abc</uws:jobId>
              <uws:phase>ERROR</uws:phase>
            </uws:job>"#;
        assert_eq!(ExecutionPhase::from_response(doc).unwrap(), ExecutionPhase::Error);
    }

    #[test]
    fn test_unknown_phase() {
        assert!(ExecutionPhase::from_response("RUNNING").is_err());
        assert!(ExecutionPhase::from_response("<job/>").is_err());
    }

    #[test]
    fn test_terminal() {
        assert!(ExecutionPhase::Completed.is_terminal());
        assert!(ExecutionPhase::Aborted.is_terminal());
        assert!(!ExecutionPhase::Queued.is_terminal());
        assert!(!ExecutionPhase::Executing.is_terminal());
    }
}
