//! 路由共享状态

use std::sync::Arc;

use medimg_ai::{DiagnosisAi, OpenRouterClient};
use medimg_auth::{MfaService, SessionManager};
use medimg_core::{AppConfig, Repository, Result};

/// 处理器共享的服务
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub mfa: MfaService,
    pub sessions: SessionManager,
    /// 未配置 API 密钥时为 None
    pub ai: Option<Arc<dyn DiagnosisAi>>,
    /// 在 MFA 设置响应中返回明文密钥（仅调试）
    pub expose_mfa_secret: bool,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn Repository>,
        mfa: MfaService,
        sessions: SessionManager,
        ai: Option<Arc<dyn DiagnosisAi>>,
    ) -> Self {
        Self {
            repo,
            mfa,
            sessions,
            ai,
            expose_mfa_secret: false,
        }
    }

    /// 按配置组装各项服务
    pub fn from_config(config: &AppConfig, repo: Arc<dyn Repository>) -> Result<Self> {
        let mfa = MfaService::from_config(&config.security)?;
        let sessions = SessionManager::from_config(&config.security);
        let ai = OpenRouterClient::from_config(&config.ai)?
            .map(|client| Arc::new(client) as Arc<dyn DiagnosisAi>);

        let mut state = Self::new(repo, mfa, sessions, ai);
        state.expose_mfa_secret = config.security.debug_expose_mfa_secret;
        Ok(state)
    }

    pub fn with_exposed_mfa_secret(mut self, expose: bool) -> Self {
        self.expose_mfa_secret = expose;
        self
    }
}
