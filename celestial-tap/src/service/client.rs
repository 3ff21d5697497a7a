use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::blocking::{Client, Response};
use std::fmt;
use std::time::{Duration, Instant};

use super::{QueryExecutor, QueryRequest, QueryType};
use crate::config::TapConfig;
use crate::error::{TapError, TapResult};
use crate::table::Table;
use crate::votable::parse_votable;
use crate::votable::uws::ExecutionPhase;

/// HTTP executor for an IVOA TAP service.
pub struct TapClient {
    config: TapConfig,
    http: Client,
    user_agent: String,
}

/// Summary of the endpoint and defaults a [`TapClient`] uses.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescription {
    pub url: String,
    pub schema: String,
    pub query_type: QueryType,
    pub maxrec: u64,
    pub fallback_maxrec: u64,
}

impl fmt::Display for ServiceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TAP service: {}", self.url)?;
        writeln!(f, "  Schema:          {}", self.schema)?;
        writeln!(f, "  Query type:      {}", self.query_type)?;
        writeln!(f, "  Default maxrec:  {}", self.maxrec)?;
        write!(f, "  Fallback maxrec: {}", self.fallback_maxrec)
    }
}

impl TapClient {
    pub fn new(config: TapConfig) -> TapResult<Self> {
        let user_agent = format!("celestial-tap/{}", env!("CARGO_PKG_VERSION"));
        let http = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                TapError::http(
                    config.base_url(),
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;
        Ok(Self {
            config,
            http,
            user_agent,
        })
    }

    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn describe(&self) -> ServiceDescription {
        ServiceDescription {
            url: self.config.base_url().to_string(),
            schema: self.config.schema.clone(),
            query_type: self.config.query_type,
            maxrec: self.config.maxrec,
            fallback_maxrec: self.config.fallback_maxrec,
        }
    }

    /// Ask the VOSI `availability` endpoint whether the service is up.
    pub fn availability(&self) -> TapResult<bool> {
        let url = format!("{}/availability", self.config.base_url());
        let body = self.checked_body(self.send(&url, self.http.get(&url))?, &url)?;
        vosi_available(&body)
    }

    fn run_sync(&self, query: &str, maxrec: Option<u64>) -> TapResult<Table> {
        let url = format!("{}/sync", self.config.base_url());
        tracing::debug!("POST {} (maxrec={:?})", url, maxrec);
        let response = self.send(&url, self.http.post(&url).form(&query_params(query, maxrec)))?;
        let body = self.checked_body(response, &url)?;
        parse_votable(&body)
    }

    fn run_sync_with_fallback(&self, query: &str, maxrec: Option<u64>) -> TapResult<Table> {
        match self.run_sync(query, maxrec) {
            Err(e) if e.is_retryable_query_failure() => {
                tracing::debug!("Sync query failed: {}", e);
                tracing::warn!(
                    "Query failed; retrying with maxrec={} (consider using async instead)",
                    self.config.fallback_maxrec
                );
                self.run_sync(query, Some(self.config.fallback_maxrec))
            }
            other => other,
        }
    }

    fn run_async(&self, query: &str, maxrec: Option<u64>) -> TapResult<Table> {
        let url = format!("{}/async", self.config.base_url());
        tracing::debug!("POST {} (maxrec={:?})", url, maxrec);
        let response = self.send(&url, self.http.post(&url).form(&query_params(query, maxrec)))?;
        // The 303 redirect to the job resource has been followed by now.
        let job = response.url().as_str().trim_end_matches('/').to_string();
        self.checked_body(response, &url)?;
        tracing::debug!("Created async job {}", job);

        let result = self.drive_job(&job);

        if let Err(e) = self
            .http
            .delete(&job)
            .send()
            .and_then(Response::error_for_status)
        {
            tracing::debug!("Could not delete job {}: {}", job, e);
        }
        result
    }

    fn drive_job(&self, job: &str) -> TapResult<Table> {
        let phase_url = format!("{}/phase", job);
        let response = self.send(&phase_url, self.http.post(&phase_url).form(&[("PHASE", "RUN")]))?;
        self.checked_body(response, &phase_url)?;

        let deadline = Instant::now() + Duration::from_secs(self.config.job_timeout_secs);
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let phase = loop {
            let response = self.send(&phase_url, self.http.get(&phase_url))?;
            let phase = ExecutionPhase::from_response(&self.checked_body(response, &phase_url)?)?;
            tracing::debug!("Job {} phase: {}", job, phase);
            if phase.is_terminal() {
                break phase;
            }
            if Instant::now() >= deadline {
                return Err(TapError::timeout(job, self.config.job_timeout_secs));
            }
            std::thread::sleep(poll);
        };

        match phase {
            ExecutionPhase::Completed => {
                let url = format!("{}/results/result", job);
                let response = self.send(&url, self.http.get(&url))?;
                parse_votable(&self.checked_body(response, &url)?)
            }
            ExecutionPhase::Error => Err(TapError::job(job, phase.as_str(), self.job_error(job))),
            _ => Err(TapError::job(job, phase.as_str(), "job did not complete")),
        }
    }

    /// Error summary of a failed job; the body may be a VOTable or plain text.
    fn job_error(&self, job: &str) -> String {
        let url = format!("{}/error", job);
        let body = match self.send(&url, self.http.get(&url)) {
            Ok(response) => response.text().unwrap_or_default(),
            Err(e) => return e.to_string(),
        };
        match parse_votable(&body) {
            Err(TapError::Service { message }) => message,
            _ if body.trim().is_empty() => "no error message".to_string(),
            _ => body.trim().to_string(),
        }
    }

    fn send(&self, url: &str, request: reqwest::blocking::RequestBuilder) -> TapResult<Response> {
        request
            .send()
            .map_err(|e| TapError::http(url, format!("Network request failed: {}", e)))
    }

    fn text(&self, response: Response, url: &str) -> TapResult<String> {
        response
            .text()
            .map_err(|e| TapError::http(url, format!("Failed to read response: {}", e)))
    }

    /// Response body on success. Error statuses whose body is a VOTable
    /// reporting `QUERY_STATUS=ERROR` become [`TapError::Service`].
    fn checked_body(&self, response: Response, url: &str) -> TapResult<String> {
        let status = response.status();
        let body = self.text(response, url)?;
        if status.is_success() {
            return Ok(body);
        }
        match parse_votable(&body) {
            Err(e @ TapError::Service { .. }) => Err(e),
            _ => Err(TapError::status(url, status.as_u16())),
        }
    }
}

impl QueryExecutor for TapClient {
    fn execute(&self, request: &QueryRequest) -> TapResult<Table> {
        if request.query.trim().is_empty() {
            tracing::warn!("Empty query provided.");
            return Ok(Table::new());
        }
        match request.query_type {
            QueryType::Sync => self.run_sync_with_fallback(&request.query, request.maxrec),
            QueryType::Async => self.run_async(&request.query, request.maxrec),
        }
    }
}

fn query_params(query: &str, maxrec: Option<u64>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("REQUEST", "doQuery".to_string()),
        ("LANG", "ADQL".to_string()),
        ("QUERY", query.to_string()),
    ];
    if let Some(maxrec) = maxrec {
        params.push(("MAXREC", maxrec.to_string()));
    }
    params
}

fn vosi_available(xml: &str) -> TapResult<bool> {
    let mut reader = Reader::from_str(xml);
    let mut in_available = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"available" => in_available = true,
            Ok(Event::Text(e)) if in_available => {
                let text = e
                    .unescape()
                    .map_err(|e| TapError::format("VOSI availability", e.to_string()))?;
                return Ok(text.trim().eq_ignore_ascii_case("true"));
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"available" => in_available = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(TapError::format("VOSI availability", e.to_string())),
            _ => {}
        }
    }
    Err(TapError::format("VOSI availability", "no available element"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const RESULT: &str = r#"<VOTABLE><RESOURCE type="results">
        <INFO name="QUERY_STATUS" value="OK"/>
        <TABLE>
          <FIELD name="id" datatype="long" ucd="meta.id;meta.main"/>
          <FIELD name="ra" datatype="double" ucd="pos.eq.ra;meta.main"/>
          <DATA><TABLEDATA>
            <TR><TD>1</TD><TD>10.5</TD></TR>
            <TR><TD>2</TD><TD>11.5</TD></TR>
          </TABLEDATA></DATA>
        </TABLE></RESOURCE></VOTABLE>"#;

    const SERVICE_ERROR: &str = r#"<VOTABLE><RESOURCE type="results">
        <INFO name="QUERY_STATUS" value="ERROR">Query timeout</INFO>
        </RESOURCE></VOTABLE>"#;

    fn client_for(server: &mockito::ServerGuard) -> TapClient {
        let config = TapConfig {
            poll_interval_ms: 1,
            job_timeout_secs: 5,
            ..TapConfig::default().with_service_url(format!("{}/tap/", server.url()))
        };
        TapClient::new(config).unwrap()
    }

    fn form(maxrec: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("REQUEST".into(), "doQuery".into()),
            Matcher::UrlEncoded("LANG".into(), "ADQL".into()),
            Matcher::UrlEncoded("QUERY".into(), "SELECT * FROM t".into()),
            Matcher::UrlEncoded("MAXREC".into(), maxrec.into()),
        ])
    }

    #[test]
    fn test_user_agent_format() {
        let server = mockito::Server::new();
        let client = client_for(&server);
        assert!(client.user_agent().starts_with("celestial-tap/"));
    }

    #[test]
    fn test_sync_query() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/tap/sync")
            .match_body(form("10"))
            .with_status(200)
            .with_header("content-type", "application/x-votable+xml")
            .with_body(RESULT)
            .create();

        let client = client_for(&server);
        let table = client
            .execute(&QueryRequest::new("SELECT * FROM t").with_maxrec(Some(10)))
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_names(), vec!["id", "ra"]);
        mock.assert();
    }

    #[test]
    fn test_sync_fallback_retries_once() {
        let mut server = mockito::Server::new();
        let failing = server
            .mock("POST", "/tap/sync")
            .match_body(form("5000"))
            .with_status(200)
            .with_body(SERVICE_ERROR)
            .expect(1)
            .create();
        let fallback = server
            .mock("POST", "/tap/sync")
            .match_body(form("100"))
            .with_status(200)
            .with_body(RESULT)
            .expect(1)
            .create();

        let client = client_for(&server);
        let table = client
            .execute(&QueryRequest::new("SELECT * FROM t").with_maxrec(Some(5000)))
            .unwrap();
        assert_eq!(table.len(), 2);
        failing.assert();
        fallback.assert();
    }

    #[test]
    fn test_sync_fallback_failure_is_returned() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/tap/sync")
            .with_status(200)
            .with_body(SERVICE_ERROR)
            .expect(2)
            .create();

        let client = client_for(&server);
        let err = client
            .execute(&QueryRequest::new("SELECT * FROM t").with_maxrec(Some(5000)))
            .unwrap_err();
        assert!(matches!(err, TapError::Service { .. }));
        mock.assert();
    }

    #[test]
    fn test_sync_http_status_not_retried() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/tap/sync")
            .with_status(404)
            .expect(1)
            .create();

        let client = client_for(&server);
        let err = client.execute(&QueryRequest::new("SELECT * FROM t")).unwrap_err();
        assert!(matches!(err, TapError::Status { status: 404, .. }));
        mock.assert();
    }

    #[test]
    fn test_empty_query_skips_service() {
        let mut server = mockito::Server::new();
        let mock = server.mock("POST", "/tap/sync").expect(0).create();

        let client = client_for(&server);
        let table = client.execute(&QueryRequest::new("   ")).unwrap();
        assert!(table.is_empty());
        mock.assert();
    }

    #[test]
    fn test_async_job_flow() {
        let mut server = mockito::Server::new();
        let job_url = format!("{}/tap/async/job1", server.url());
        let create = server
            .mock("POST", "/tap/async")
            .with_status(303)
            .with_header("location", &job_url)
            .create();
        let job_doc = server
            .mock("GET", "/tap/async/job1")
            .with_status(200)
            .with_body("<uws:job xmlns:uws=\"http://www.ivoa.net/xml/UWS/v1.0\"><uws:phase>PENDING</uws:phase></uws:job>")
            .create();
        let run = server
            .mock("POST", "/tap/async/job1/phase")
            .match_body(Matcher::UrlEncoded("PHASE".into(), "RUN".into()))
            .with_status(200)
            .create();
        let phase = server
            .mock("GET", "/tap/async/job1/phase")
            .with_status(200)
            .with_body("COMPLETED")
            .create();
        let result = server
            .mock("GET", "/tap/async/job1/results/result")
            .with_status(200)
            .with_body(RESULT)
            .create();
        let delete = server
            .mock("DELETE", "/tap/async/job1")
            .with_status(200)
            .create();

        let client = client_for(&server);
        let table = client
            .execute(&QueryRequest::new("SELECT * FROM t").with_query_type(QueryType::Async))
            .unwrap();
        assert_eq!(table.len(), 2);

        for mock in [create, job_doc, run, phase, result, delete] {
            mock.assert();
        }
    }

    #[test]
    fn test_async_job_error() {
        let mut server = mockito::Server::new();
        let job_url = format!("{}/tap/async/job2", server.url());
        server
            .mock("POST", "/tap/async")
            .with_status(303)
            .with_header("location", &job_url)
            .create();
        server
            .mock("GET", "/tap/async/job2")
            .with_status(200)
            .with_body("PENDING")
            .create();
        server
            .mock("POST", "/tap/async/job2/phase")
            .with_status(200)
            .create();
        server
            .mock("GET", "/tap/async/job2/phase")
            .with_status(200)
            .with_body("ERROR")
            .create();
        server
            .mock("GET", "/tap/async/job2/error")
            .with_status(200)
            .with_body(SERVICE_ERROR)
            .create();
        server
            .mock("DELETE", "/tap/async/job2")
            .with_status(200)
            .create();

        let client = client_for(&server);
        let err = client
            .execute(&QueryRequest::new("SELECT * FROM t").with_query_type(QueryType::Async))
            .unwrap_err();
        match err {
            TapError::Job { phase, message, .. } => {
                assert_eq!(phase, "ERROR");
                assert_eq!(message, "Query timeout");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_availability() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/tap/availability")
            .with_status(200)
            .with_body(
                r#"<vosi:availability xmlns:vosi="http://www.ivoa.net/xml/VOSIAvailability/v1.0">
                   <vosi:available>true</vosi:available>
                   </vosi:availability>"#,
            )
            .create();

        let client = client_for(&server);
        assert!(client.availability().unwrap());
        mock.assert();
    }

    #[test]
    fn test_describe() {
        let server = mockito::Server::new();
        let client = client_for(&server);
        let description = client.describe();
        assert_eq!(description.url, format!("{}/tap", server.url()));
        assert_eq!(description.maxrec, 1000);
        let text = description.to_string();
        assert!(text.contains("Fallback maxrec: 100"));
        assert!(text.contains("Query type:      sync"));
    }

    #[test]
    fn test_vosi_unavailable() {
        let doc = "<availability><available>false</available></availability>";
        assert!(!vosi_available(doc).unwrap());
        assert!(vosi_available("<availability/>").is_err());
    }

    /// Mocks an async job that always reports `phase`; returns the DELETE mock.
    fn job_stuck_in(server: &mut mockito::ServerGuard, job: &str, phase: &str) -> mockito::Mock {
        let job_url = format!("{}/tap/async/{}", server.url(), job);
        server
            .mock("POST", "/tap/async")
            .with_status(303)
            .with_header("location", &job_url)
            .create();
        server
            .mock("GET", format!("/tap/async/{}", job).as_str())
            .with_status(200)
            .with_body("PENDING")
            .create();
        server
            .mock("POST", format!("/tap/async/{}/phase", job).as_str())
            .with_status(200)
            .create();
        server
            .mock("GET", format!("/tap/async/{}/phase", job).as_str())
            .with_status(200)
            .with_body(phase)
            .create();
        server
            .mock("DELETE", format!("/tap/async/{}", job).as_str())
            .with_status(200)
            .create()
    }

    #[test]
    fn test_async_job_timeout() {
        let mut server = mockito::Server::new();
        let delete = job_stuck_in(&mut server, "job3", "EXECUTING");
        let result_mock = server
            .mock("GET", "/tap/async/job3/results/result")
            .expect(0)
            .create();

        let config = TapConfig {
            poll_interval_ms: 1,
            job_timeout_secs: 0,
            ..TapConfig::default().with_service_url(format!("{}/tap", server.url()))
        };
        let err = TapClient::new(config)
            .unwrap()
            .execute(&QueryRequest::new("SELECT * FROM t").with_query_type(QueryType::Async))
            .unwrap_err();
        match err {
            TapError::Timeout { job, seconds } => {
                assert!(job.ends_with("/tap/async/job3"));
                assert_eq!(seconds, 0);
            }
            other => panic!("unexpected error: {}", other),
        }
        result_mock.assert();
        delete.assert();
    }

    #[test]
    fn test_async_job_aborted() {
        let mut server = mockito::Server::new();
        let delete = job_stuck_in(&mut server, "job4", "ABORTED");

        let client = client_for(&server);
        let err = client
            .execute(&QueryRequest::new("SELECT * FROM t").with_query_type(QueryType::Async))
            .unwrap_err();
        match err {
            TapError::Job { phase, .. } => assert_eq!(phase, "ABORTED"),
            other => panic!("unexpected error: {}", other),
        }
        delete.assert();
    }
}
