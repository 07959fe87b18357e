//! Submission archive collaborator: best-effort upload of submitted work
//! to an external script endpoint, and document export with a bounded wait
//! and a locally rendered printable fallback.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::{AtlSkill, Challenge, GradeLevel, SkillDomain};
use crate::error::ServiceError;
use crate::submission::SubmissionFile;

/// How long we wait for the export backend before rendering locally.
const DOC_EXPORT_TIMEOUT_SECS: u64 = 8;

/// Wire payload posted to the archive endpoint.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivePayload {
  pub student_name: String,
  pub student_id: String,
  pub grade: GradeLevel,
  pub domain: SkillDomain,
  pub challenge_title: String,
  pub submission_text: String,
  pub ai_feedback: String,
  pub atl_skills: Vec<AtlSkill>,
  pub files: Vec<SubmissionFile>,
}

/// What the archive reported back for a stored submission.
#[derive(Clone, Debug)]
pub struct ArchiveReceipt {
  pub message: Option<String>,
  pub file_urls: Vec<String>,
}

/// Result of a document export. Either a backend URL or locally rendered
/// HTML, never an error: export always degrades to the local document.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocExport {
  pub doc_url: Option<String>,
  pub html: Option<String>,
  pub is_fallback: bool,
  pub message: Option<String>,
}

#[async_trait]
pub trait SubmissionArchive: Send + Sync {
  /// Best-effort: a failure here is surfaced as a warning upstream, never a
  /// rollback of in-memory state.
  async fn archive(&self, payload: &ArchivePayload) -> Result<ArchiveReceipt, ServiceError>;

  async fn export_document(&self, challenge: &Challenge, student_name: &str) -> DocExport;
}

/// Archive backed by an external web-app script endpoint (ARCHIVE_URL).
pub struct HttpArchive {
  client: reqwest::Client,
  endpoint: String,
}

impl HttpArchive {
  pub fn from_env() -> Option<Self> {
    let endpoint = std::env::var("ARCHIVE_URL").ok()?;
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;
    Some(Self { client, endpoint })
  }
}

#[derive(Deserialize)]
struct ArchiveResponse {
  success: bool,
  #[serde(default)]
  message: Option<String>,
  #[serde(default, rename = "fileUrls")]
  file_urls: Vec<String>,
  #[serde(default, rename = "docUrl")]
  doc_url: Option<String>,
}

#[async_trait]
impl SubmissionArchive for HttpArchive {
  #[instrument(level = "info", skip(self, payload), fields(challenge = %payload.challenge_title, files = payload.files.len()))]
  async fn archive(&self, payload: &ArchivePayload) -> Result<ArchiveReceipt, ServiceError> {
    let res = self
      .client
      .post(&self.endpoint)
      .json(payload)
      .send()
      .await
      .map_err(|e| ServiceError::Network(e.to_string()))?;
    let status = res.status().as_u16();
    let body: ArchiveResponse = res
      .json()
      .await
      .map_err(|e| ServiceError::Malformed(e.to_string()))?;
    if !body.success {
      return Err(ServiceError::Api {
        status,
        message: body.message.unwrap_or_else(|| "archive rejected the submission".into()),
      });
    }
    info!(target: "challenge", files = body.file_urls.len(), "Submission archived");
    Ok(ArchiveReceipt { message: body.message, file_urls: body.file_urls })
  }

  /// Try the backend first inside a bounded wait; on timeout or any error,
  /// render the printable document locally and mark it a fallback.
  #[instrument(level = "info", skip(self, challenge), fields(challenge_id = %challenge.id))]
  async fn export_document(&self, challenge: &Challenge, student_name: &str) -> DocExport {
    let request = self
      .client
      .post(&self.endpoint)
      .json(&serde_json::json!({
        "action": "CREATE_DOC",
        "studentName": student_name,
        "grade": challenge.grade,
        "domain": challenge.domain,
        "title": challenge.title,
        "description": challenge.description,
        "scenario": challenge.scenario,
        "rubric": challenge.rubric,
        "tools": challenge.tools,
      }))
      .send();

    let attempt = async {
      let res = request.await.map_err(|e| ServiceError::Network(e.to_string()))?;
      let status = res.status().as_u16();
      let body: ArchiveResponse = res
        .json()
        .await
        .map_err(|e| ServiceError::Malformed(e.to_string()))?;
      match (body.success, body.doc_url) {
        (true, Some(url)) => Ok(url),
        _ => Err(ServiceError::Api {
          status,
          message: body.message.unwrap_or_else(|| "export backend failed".into()),
        }),
      }
    };

    match tokio::time::timeout(Duration::from_secs(DOC_EXPORT_TIMEOUT_SECS), attempt).await {
      Ok(Ok(url)) => DocExport {
        // Serve the copy link rather than the edit link.
        doc_url: Some(rewrite_to_copy_url(&url)),
        html: None,
        is_fallback: false,
        message: None,
      },
      Ok(Err(e)) => {
        warn!(target: "challenge", error = %e, "Export backend failed; rendering local document");
        local_doc_export(challenge, student_name)
      }
      Err(_) => {
        warn!(target: "challenge", timeout_s = DOC_EXPORT_TIMEOUT_SECS, "Export backend timed out; rendering local document");
        local_doc_export(challenge, student_name)
      }
    }
  }
}

/// Archive used when ARCHIVE_URL is unset: uploads are rejected as
/// unconfigured (a warning upstream), exports render locally.
pub struct LocalArchive;

#[async_trait]
impl SubmissionArchive for LocalArchive {
  async fn archive(&self, _payload: &ArchivePayload) -> Result<ArchiveReceipt, ServiceError> {
    Err(ServiceError::NotConfigured("archive endpoint"))
  }

  #[instrument(level = "info", skip(self, challenge), fields(challenge_id = %challenge.id))]
  async fn export_document(&self, challenge: &Challenge, student_name: &str) -> DocExport {
    local_doc_export(challenge, student_name)
  }
}

fn local_doc_export(challenge: &Challenge, student_name: &str) -> DocExport {
  DocExport {
    doc_url: None,
    html: Some(render_document(challenge, student_name)),
    is_fallback: true,
    message: Some("Opened printable document.".into()),
  }
}

/// Google-doc edit/view links become copy links for students.
fn rewrite_to_copy_url(url: &str) -> String {
  for marker in ["/edit", "/view"] {
    if let Some(idx) = url.find(marker) {
      return format!("{}/copy", &url[..idx]);
    }
  }
  url.to_string()
}

/// Standalone printable HTML brief for a challenge. The client opens it as a
/// blob and prints it; good enough when the doc backend is unreachable.
fn render_document(challenge: &Challenge, student_name: &str) -> String {
  let tools = if challenge.tools.is_empty() {
    "<li>None specified</li>".to_string()
  } else {
    challenge
      .tools
      .iter()
      .map(|t| format!("<li>{t}</li>"))
      .collect::<Vec<_>>()
      .join("")
  };
  let rubric_rows = if challenge.rubric.is_empty() {
    "<tr><td colspan=\"3\">No rubric items.</td></tr>".to_string()
  } else {
    challenge
      .rubric
      .iter()
      .map(|r| {
        format!(
          "<tr><td><strong>{}</strong></td><td>{}</td><td class=\"points\">{}</td></tr>",
          r.criterion, r.description, r.points
        )
      })
      .collect::<Vec<_>>()
      .join("")
  };
  format!(
    r#"<html>
<head>
  <title>{title} - Challenge Brief</title>
  <style>
    body {{ font-family: 'Helvetica', 'Arial', sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 40px auto; padding: 20px; }}
    h1 {{ color: #111; border-bottom: 2px solid #eee; padding-bottom: 10px; }}
    h2 {{ color: #444; margin-top: 30px; font-size: 18px; text-transform: uppercase; }}
    .meta {{ color: #666; font-size: 14px; margin-bottom: 30px; }}
    .rubric-table {{ width: 100%; border-collapse: collapse; margin-top: 10px; }}
    .rubric-table th, .rubric-table td {{ border: 1px solid #ddd; padding: 12px; text-align: left; }}
    .points {{ font-weight: bold; color: #2563eb; }}
    @media print {{ body {{ margin: 0; padding: 20px; }} }}
  </style>
</head>
<body>
  <h1>{title}</h1>
  <div class="meta"><strong>Student:</strong> {student} &nbsp;|&nbsp; <strong>Grade:</strong> {grade} &nbsp;|&nbsp; <strong>Domain:</strong> {domain}</div>
  <h2>The Scenario</h2>
  <p>{scenario}</p>
  <h2>Instructions</h2>
  <p>{description}</p>
  <h2>Tools Required</h2>
  <ul>{tools}</ul>
  <h2>Assessment Rubric</h2>
  <table class="rubric-table">
    <thead><tr><th>Criterion</th><th>Description</th><th>Points</th></tr></thead>
    <tbody>{rubric_rows}</tbody>
  </table>
</body>
</html>"#,
    title = challenge.title,
    student = student_name,
    grade = challenge.grade,
    domain = challenge.domain,
    scenario = if challenge.scenario.is_empty() { "No scenario provided." } else { challenge.scenario.as_str() },
    description = challenge.description,
    tools = tools,
    rubric_rows = rubric_rows,
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ChallengeDraft, RubricItem};

  fn challenge() -> Challenge {
    ChallengeDraft {
      title: "Basic Box Joint".into(),
      description: "Build a box.".into(),
      tools: vec!["Tenon saw".into()],
      rubric: vec![RubricItem {
        criterion: "C.2".into(),
        points: 8,
        description: "Demonstrate technical skills.".into(),
      }],
      ..ChallengeDraft::default()
    }
    .publish(SkillDomain::Woodwork, GradeLevel::G6)
    .expect("valid")
  }

  #[test]
  fn copy_url_rewrite_strips_edit_suffix() {
    assert_eq!(
      rewrite_to_copy_url("https://docs.example/d/abc/edit?usp=sharing"),
      "https://docs.example/d/abc/copy"
    );
    assert_eq!(
      rewrite_to_copy_url("https://docs.example/d/abc/view"),
      "https://docs.example/d/abc/copy"
    );
    assert_eq!(rewrite_to_copy_url("https://docs.example/d/abc"), "https://docs.example/d/abc");
  }

  #[test]
  fn local_document_carries_rubric_and_meta() {
    let html = render_document(&challenge(), "Alice");
    assert!(html.contains("Basic Box Joint"));
    assert!(html.contains("Alice"));
    assert!(html.contains("C.2"));
    assert!(html.contains("Tenon saw"));
  }

  #[tokio::test]
  async fn unconfigured_archive_rejects_but_still_exports_locally() {
    let ch = challenge();
    let export = LocalArchive.export_document(&ch, "Alice").await;
    assert!(export.is_fallback);
    assert!(export.doc_url.is_none());
    assert!(export.html.unwrap().contains("Basic Box Joint"));

    let err = LocalArchive
      .archive(&ArchivePayload {
        student_name: "Alice".into(),
        student_id: "alice@fis.ed.jp".into(),
        grade: ch.grade,
        domain: ch.domain,
        challenge_title: ch.title.clone(),
        submission_text: "Box joint holds weight.".into(),
        ai_feedback: String::new(),
        atl_skills: Vec::new(),
        files: Vec::new(),
      })
      .await
      .unwrap_err();
    assert!(matches!(err, ServiceError::NotConfigured(_)));
  }
}
