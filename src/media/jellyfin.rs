use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{MediaServerClient, RemoteError, validate_user_id};
use crate::limits::User;

/// Media server REST client
///
/// Folder lists and the disabled flag both live in the user's policy
/// document; writes fetch the current policy, change one field and post the
/// whole document back so unrelated settings survive.
#[derive(Debug, Clone)]
pub struct JellyfinClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserDto {
    id: String,
    name: String,
}

impl JellyfinClient {
    pub fn new(client: Client, base_url: &str, token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("MediaBrowser Token={}", self.token))
            .header("Accept", "application/json")
    }

    /// Fetch the policy document of one user
    async fn get_policy(&self, user_id: &str) -> Result<Value, RemoteError> {
        validate_user_id(user_id)?;
        let url = format!("{}/Users/{}", self.base_url, user_id);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| RemoteError::transport(&url, e))?;

        if response.status() != StatusCode::OK {
            return Err(RemoteError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::decode(&url, e.to_string()))?;

        body.get("Policy")
            .filter(|p| p.is_object())
            .cloned()
            .ok_or_else(|| RemoteError::decode(&url, "user has no Policy object"))
    }

    /// Replace the policy document of one user
    async fn set_policy(&self, user_id: &str, policy: &Value) -> Result<(), RemoteError> {
        validate_user_id(user_id)?;
        let url = format!("{}/Users/{}/Policy", self.base_url, user_id);

        let response = self
            .authorized(self.client.post(&url))
            .json(policy)
            .send()
            .await
            .map_err(|e| RemoteError::transport(&url, e))?;

        if !response.status().is_success() {
            return Err(RemoteError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }

    async fn update_policy<F>(&self, user_id: &str, change: F) -> Result<(), RemoteError>
    where
        F: FnOnce(&mut serde_json::Map<String, Value>) + Send,
    {
        let mut policy = self.get_policy(user_id).await?;
        if let Some(fields) = policy.as_object_mut() {
            change(fields);
        }
        self.set_policy(user_id, &policy).await
    }
}

/// Folder ids listed in a policy document
pub(crate) fn enabled_folders(policy: &Value) -> Vec<String> {
    policy
        .get("EnabledFolders")
        .and_then(Value::as_array)
        .map(|folders| {
            folders
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Disabled flag of a policy document; absent means enabled
pub(crate) fn is_disabled(policy: &Value) -> bool {
    policy
        .get("IsDisabled")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[async_trait]
impl MediaServerClient for JellyfinClient {
    async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        let url = format!("{}/Users", self.base_url);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| RemoteError::transport(&url, e))?;

        if response.status() != StatusCode::OK {
            return Err(RemoteError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let users: Vec<UserDto> = response
            .json()
            .await
            .map_err(|e| RemoteError::decode(&url, e.to_string()))?;

        Ok(users
            .into_iter()
            .map(|u| User::new(u.id, u.name))
            .collect())
    }

    async fn get_enabled_folders(&self, user_id: &str) -> Result<Vec<String>, RemoteError> {
        let policy = self.get_policy(user_id).await?;
        Ok(enabled_folders(&policy))
    }

    async fn get_disabled(&self, user_id: &str) -> Result<bool, RemoteError> {
        let policy = self.get_policy(user_id).await?;
        Ok(is_disabled(&policy))
    }

    async fn set_enabled_folders(
        &self,
        user_id: &str,
        folders: &[String],
    ) -> Result<(), RemoteError> {
        let folders = Value::from(folders.to_vec());
        self.update_policy(user_id, move |policy| {
            policy.insert("EnabledFolders".to_string(), folders);
        })
        .await
    }

    async fn set_disabled(&self, user_id: &str, disabled: bool) -> Result<(), RemoteError> {
        self.update_policy(user_id, move |policy| {
            policy.insert("IsDisabled".to_string(), Value::Bool(disabled));
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enabled_folders_from_policy() {
        let policy = json!({
            "IsAdministrator": false,
            "EnabledFolders": ["a1", "b2", 7, "c3"],
        });
        assert_eq!(enabled_folders(&policy), vec!["a1", "b2", "c3"]);
        assert!(enabled_folders(&json!({})).is_empty());
    }

    #[test]
    fn test_disabled_flag_from_policy() {
        assert!(is_disabled(&json!({"IsDisabled": true})));
        assert!(!is_disabled(&json!({"IsDisabled": false})));
        assert!(!is_disabled(&json!({})));
    }

    #[test]
    fn test_user_list_decodes_pascal_case() {
        let users: Vec<UserDto> = serde_json::from_value(json!([
            {"Id": "abc", "Name": "Alice", "HasPassword": true},
            {"Id": "def", "Name": "Bob"},
        ]))
        .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, "abc");
        assert_eq!(users[1].name, "Bob");
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let client = JellyfinClient::new(Client::new(), "http://jf:8096/", "t");
        assert_eq!(client.base_url, "http://jf:8096");
    }
}
