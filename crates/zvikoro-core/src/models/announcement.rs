use serde::{Deserialize, Serialize};

/// A public message posted by district staff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Announcement {
    /// Author line for display, e.g. "alice (Accounts)"
    pub fn author_display(&self) -> String {
        let name = self.username.as_deref().unwrap_or("unknown");
        match self.department.as_deref().filter(|d| !d.is_empty()) {
            Some(dept) => format!("{} ({})", name, dept),
            None => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_public_messages() {
        let json = r#"[{"id": 1, "username": "alice", "department": "Accounts", "message": "Fees due Friday", "profile_picture": null},
                      {"id": 2, "message": "Schools closed Monday"}]"#;
        let items: Vec<Announcement> = serde_json::from_str(json).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].author_display(), "alice (Accounts)");
        assert_eq!(items[1].author_display(), "unknown");
        assert_eq!(items[1].message, "Schools closed Monday");
    }
}
