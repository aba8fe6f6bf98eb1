//! 共享令牌认证：`/file` 请求的访问控制。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::Request;
use axum::middleware;
use axum::response::{Json as JsonResponse, Response};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::AUTH_PARAM;
use crate::error::ApiError;
use crate::http::apply_gate_headers;

/// 启动时加载一次的共享令牌，之后不再变更。
#[derive(Debug)]
pub struct AuthConfig {
    pub token: String,
}

impl AuthConfig {
    /// 拒绝空令牌：否则不带 `auth` 参数的请求也能通过。
    pub fn new(token: String) -> Result<Self, std::io::Error> {
        if token.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "TOKEN must not be empty",
            ));
        }
        Ok(Self { token })
    }

    /// 常量时间比较候选令牌。
    pub fn accepts(&self, candidate: &str) -> bool {
        candidate.as_bytes().ct_eq(self.token.as_bytes()).into()
    }
}

/// 取查询串中第一个 `auth` 参数；重复参数只看第一个。
fn presented_token(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == AUTH_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// 认证中间件：校验 `auth` 参数，通过后补充跨域与内容类型响应头。
pub async fn auth_gate(
    Extension(auth): Extension<Arc<AuthConfig>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    let presented = presented_token(req.uri().query()).unwrap_or_default();
    if !auth.accepts(&presented) {
        debug!(
            method = %req.method(),
            path = req.uri().path(),
            "rejected request with bad token"
        );
        return Err(ApiError::Forbidden("Unauthorized".into()));
    }

    let mut response = next.run(req).await;
    apply_gate_headers(response.headers_mut());
    Ok(response)
}

/// 返回当前配置的令牌（JSON 字符串）。
pub async fn get_token(Extension(auth): Extension<Arc<AuthConfig>>) -> JsonResponse<String> {
    JsonResponse(auth.token.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_exact_token() {
        let auth = AuthConfig::new("s3cret".into()).expect("auth config");
        assert!(auth.accepts("s3cret"));
        assert!(!auth.accepts("s3cre"));
        assert!(!auth.accepts("s3cret "));
        assert!(!auth.accepts("S3CRET"));
        assert!(!auth.accepts(""));
    }

    #[test]
    fn first_auth_parameter_wins() {
        assert_eq!(
            presented_token(Some("auth=nope&auth=s3cret")).as_deref(),
            Some("nope")
        );
        assert_eq!(
            presented_token(Some("page=2&auth=s3%20cret")).as_deref(),
            Some("s3 cret")
        );
        assert_eq!(presented_token(Some("page=2")), None);
        assert_eq!(presented_token(None), None);
    }

    #[test]
    fn empty_token_is_rejected_at_startup() {
        assert!(AuthConfig::new(String::new()).is_err());
    }
}
