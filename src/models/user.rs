use serde::{Deserialize, Serialize};

/// The signed-in user's profile, shown on the home view after login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub nickname: String,

    #[serde(rename = "avatarUrl", default)]
    pub avatar_url: Option<String>,

    #[serde(rename = "isVip", default)]
    pub is_vip: bool,

    /// Expiry date string as the platform reports it, e.g. "2026-12-31"
    #[serde(rename = "vipExpiresAt", default)]
    pub vip_expires_at: Option<String>,
}

impl UserProfile {
    /// Display name, falling back when the platform returns an empty one
    pub fn display_name(&self) -> &str {
        if self.nickname.is_empty() {
            "(unnamed account)"
        } else {
            &self.nickname
        }
    }

    /// Membership line for the home view
    pub fn membership_display(&self) -> String {
        if self.is_vip {
            match &self.vip_expires_at {
                Some(date) => format!("VIP until {}", date),
                None => "VIP".to_string(),
            }
        } else {
            "Free plan".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile() {
        let json = r#"{
            "nickname": "Wen",
            "avatarUrl": "https://cdn.inkdesk.io/avatars/wen.png",
            "isVip": true,
            "vipExpiresAt": "2026-12-31"
        }"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.display_name(), "Wen");
        assert_eq!(profile.membership_display(), "VIP until 2026-12-31");
    }

    #[test]
    fn test_parse_profile_sparse() {
        let profile: UserProfile = serde_json::from_str("{}").unwrap();
        assert_eq!(profile.display_name(), "(unnamed account)");
        assert_eq!(profile.membership_display(), "Free plan");
    }
}
