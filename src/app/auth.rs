// ==========================================
// 染整车间生产流程引擎 - 令牌鉴权
// ==========================================
// 请求头: Authorization: Bearer <token>
// 令牌校验是外部协作方, 经 TokenVerifier 接入
// 缺失或无效令牌一律 401
// ==========================================

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::api::error::ApiError;
use crate::app::state::AppState;
use crate::domain::actor::Actor;

/// 令牌校验器
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// 校验令牌, 返回令牌携带的 {id, role, name}; 无效时返回 None
    async fn verify(&self, token: &str) -> Option<Actor>;
}

// ==========================================
// StaticTokenVerifier - 静态令牌表
// ==========================================
// 文件格式: { "<token>": { "id": "...", "role": "admin", "name": "..." } }
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Actor>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: HashMap<String, Actor>) -> Self {
        Self { tokens }
    }

    /// 从 JSON 文件加载
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("读取令牌表失败 {}: {}", path.display(), e))?;
        let tokens: HashMap<String, Actor> = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("令牌表格式错误 {}: {}", path.display(), e))?;
        tracing::info!(path = %path.display(), count = tokens.len(), "令牌表已加载");
        Ok(Self::new(tokens))
    }

    pub fn with_token(mut self, token: impl Into<String>, actor: Actor) -> Self {
        self.tokens.insert(token.into(), actor);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<Actor> {
        self.tokens.get(token).cloned()
    }
}

/// 从请求头取 Bearer 令牌
pub fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

// ==========================================
// Actor 提取器
// ==========================================
impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            tracing::debug!(path = %parts.uri.path(), "请求未携带令牌");
            return Err(ApiError::Unauthorized("No token provided".to_string()));
        };
        match state.token_verifier.verify(&token).await {
            Some(actor) => Ok(actor),
            None => {
                tracing::warn!(path = %parts.uri.path(), "令牌无效");
                Err(ApiError::Unauthorized("Invalid/expired token".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Role;
    use axum::http::Request;
    use std::io::Write;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/process/jobs");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("Bearer   "))), None);
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }

    #[tokio::test]
    async fn test_static_verifier_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"tok-admin": {{"id": "u1", "role": "admin", "name": "Lakshmi"}},
                "tok-op": {{"id": "u2", "role": "operator", "name": "Ravi"}}}}"#
        )
        .unwrap();

        let verifier = StaticTokenVerifier::from_json_file(file.path()).unwrap();
        assert_eq!(verifier.len(), 2);
        let actor = verifier.verify("tok-op").await.unwrap();
        assert_eq!(actor.role, Role::Operator);
        assert_eq!(actor.name, "Ravi");
        assert!(verifier.verify("nope").await.is_none());
    }
}
