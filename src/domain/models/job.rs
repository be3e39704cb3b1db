//! Read-only projections of the job and candidate the core applies with.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ATS vendor that hosts a job's application form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Greenhouse,
    Lever,
    /// Any vendor without a dedicated agent
    Other(String),
}

impl JobSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Greenhouse => "greenhouse",
            Self::Lever => "lever",
            Self::Other(tag) => tag,
        }
    }

    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "greenhouse" => Self::Greenhouse,
            "lever" => Self::Lever,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for JobSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job as seen by the core. Never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub source: JobSource,
    pub apply_url: String,
    pub title: String,
    pub company: String,
}

impl Job {
    /// Lower-cased host of the apply URL, if it has one.
    pub fn apply_host(&self) -> Option<String> {
        host_of(&self.apply_url)
    }
}

/// Extract the lower-cased host of a URL.
pub fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .filter(|h| !h.is_empty())
}

/// Candidate data used to fill application forms.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub resume_file_reference: Option<String>,
}

impl CandidateProfile {
    /// First and last name, split on the last whitespace.
    pub fn split_name(&self) -> (Option<&str>, Option<&str>) {
        let name = self.full_name.trim();
        if name.is_empty() {
            return (None, None);
        }
        match name.rsplit_once(char::is_whitespace) {
            Some((first, last)) => (Some(first.trim()), Some(last.trim())),
            None => (Some(name), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_parsing() {
        assert_eq!(JobSource::parse("Greenhouse"), JobSource::Greenhouse);
        assert_eq!(JobSource::parse(" lever "), JobSource::Lever);
        assert_eq!(JobSource::parse("workday"), JobSource::Other("workday".into()));
        assert_eq!(JobSource::parse("workday").as_str(), "workday");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(
            host_of("https://boards.Greenhouse.io/acme/jobs/123").as_deref(),
            Some("boards.greenhouse.io")
        );
        assert_eq!(host_of("not a url"), None);
        assert_eq!(host_of("mailto:jobs@example.com"), None);
    }

    #[test]
    fn test_split_name() {
        let mut profile = CandidateProfile {
            full_name: "Ada King Lovelace".into(),
            ..Default::default()
        };
        assert_eq!(profile.split_name(), (Some("Ada King"), Some("Lovelace")));

        profile.full_name = "Prince".into();
        assert_eq!(profile.split_name(), (Some("Prince"), None));

        profile.full_name = "   ".into();
        assert_eq!(profile.split_name(), (None, None));
    }
}
