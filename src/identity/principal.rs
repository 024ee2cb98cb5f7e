use serde::{Deserialize, Serialize};

/// Who the backend says the current access credential belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerIdentity {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CallerIdentity {
    /// Initials for avatar fallbacks: first letter of the first and last name.
    pub fn initials(&self) -> String {
        let Some(name) = self.full_name.as_deref().filter(|n| !n.trim().is_empty()) else {
            return "AD".to_string();
        };
        let parts: Vec<&str> = name.split_whitespace().collect();
        let first = parts.first().and_then(|p| p.chars().next());
        let last = if parts.len() > 1 { parts.last().and_then(|p| p.chars().next()) } else { None };
        first.into_iter().chain(last).collect::<String>().to_uppercase()
    }
}
