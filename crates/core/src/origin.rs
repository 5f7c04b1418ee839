use std::fmt;

use bone_gateway_util::{AppConfig, Environment};

/// Ordered set of origins permitted outside the development bypass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    origins: Vec<String>,
}

impl AllowList {
    /// Builds the list from the frontend URL and the optional deployment host.
    ///
    /// The deployment host is added as `https://<host>`. Blank entries are
    /// dropped so the list never carries empty strings.
    pub fn from_urls(frontend_url: &str, deployment_host: Option<&str>) -> Self {
        let origins = [
            Some(frontend_url.trim().to_string()),
            deployment_host
                .map(str::trim)
                .filter(|host| !host.is_empty())
                .map(|host| format!("https://{host}")),
        ]
        .into_iter()
        .flatten()
        .filter(|origin| !origin.is_empty())
        .collect();

        Self { origins }
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.origins.iter().any(|allowed| allowed == origin)
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.origins.iter().map(String::as_str)
    }
}

/// Why an origin was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    /// No `Origin` header: server-to-server or same-origin traffic.
    NoOrigin,
    /// Development mode and the origin points at a local machine.
    LocalDevelopment,
    AllowListed,
}

impl AllowReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoOrigin => "no_origin",
            Self::LocalDevelopment => "local_development",
            Self::AllowListed => "allow_listed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotAllowListed,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAllowListed => f.write_str("origin not in allow-list"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginDecision {
    Allow(AllowReason),
    Deny(DenyReason),
}

impl OriginDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// Origin admission policy, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    environment: Environment,
    allow_list: AllowList,
    lan_prefix: String,
}

impl OriginPolicy {
    pub fn new(
        environment: Environment,
        allow_list: AllowList,
        lan_prefix: impl Into<String>,
    ) -> Self {
        Self {
            environment,
            allow_list,
            lan_prefix: lan_prefix.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.environment,
            AllowList::from_urls(&config.frontend_url, config.railway_static_url.as_deref()),
            config.lan_origin_prefix.clone(),
        )
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Decides whether `origin` may talk to the gateway. First match wins:
    /// absent origin, development local bypass, allow-list membership.
    pub fn decide(&self, origin: Option<&str>) -> OriginDecision {
        let Some(origin) = origin else {
            return OriginDecision::Allow(AllowReason::NoOrigin);
        };

        if !self.environment.is_production() && self.is_local(origin) {
            return OriginDecision::Allow(AllowReason::LocalDevelopment);
        }

        if self.allow_list.contains(origin) {
            return OriginDecision::Allow(AllowReason::AllowListed);
        }

        OriginDecision::Deny(DenyReason::NotAllowListed)
    }

    fn is_local(&self, origin: &str) -> bool {
        (!self.lan_prefix.is_empty() && origin.starts_with(&self.lan_prefix))
            || origin.contains("localhost")
            || origin.contains("127.0.0.1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRONTEND: &str = "https://boneandbone.netlify.app";

    fn policy(environment: Environment, deployment: Option<&str>) -> OriginPolicy {
        OriginPolicy::new(
            environment,
            AllowList::from_urls(FRONTEND, deployment),
            "http://192.168.18.118",
        )
    }

    #[test]
    fn absent_origin_is_allowed_in_every_mode() {
        for env in [Environment::Production, Environment::Development] {
            assert_eq!(
                policy(env, None).decide(None),
                OriginDecision::Allow(AllowReason::NoOrigin)
            );
        }
    }

    #[test]
    fn development_admits_local_origins() {
        let policy = policy(Environment::Development, None);
        for origin in [
            "http://localhost:3000",
            "http://localhost:5173",
            "http://127.0.0.1:8080",
            "http://192.168.18.118:5173",
        ] {
            assert_eq!(
                policy.decide(Some(origin)),
                OriginDecision::Allow(AllowReason::LocalDevelopment),
                "{origin}"
            );
        }
    }

    #[test]
    fn development_denies_foreign_origins() {
        let decision = policy(Environment::Development, None).decide(Some("http://myevilsite.com"));
        assert_eq!(decision, OriginDecision::Deny(DenyReason::NotAllowListed));
        assert_eq!(
            DenyReason::NotAllowListed.to_string(),
            "origin not in allow-list"
        );
    }

    #[test]
    fn development_still_honours_allow_list() {
        let decision = policy(Environment::Development, None).decide(Some(FRONTEND));
        assert_eq!(decision, OriginDecision::Allow(AllowReason::AllowListed));
    }

    #[test]
    fn production_admits_only_allow_listed_origins() {
        let policy = policy(Environment::Production, Some("api.up.railway.app"));
        assert!(policy.decide(Some(FRONTEND)).is_allowed());
        assert!(policy.decide(Some("https://api.up.railway.app")).is_allowed());
        assert!(!policy.decide(Some("http://localhost:3000")).is_allowed());
        assert!(!policy.decide(Some("http://192.168.18.118:5173")).is_allowed());
        assert!(!policy.decide(Some("https://boneandbone.netlify.app.evil.com")).is_allowed());
    }

    #[test]
    fn decisions_are_stable_across_calls() {
        let policy = policy(Environment::Production, None);
        let origins = [None, Some(FRONTEND), Some("http://localhost:3000")];
        let first: Vec<_> = origins.iter().map(|o| policy.decide(*o)).collect();
        for _ in 0..10 {
            let again: Vec<_> = origins.iter().map(|o| policy.decide(*o)).collect();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn allow_list_has_one_entry_without_deployment_host() {
        let list = AllowList::from_urls(FRONTEND, None);
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![FRONTEND]);
    }

    #[test]
    fn allow_list_has_two_entries_with_deployment_host() {
        let list = AllowList::from_urls(FRONTEND, Some("api.up.railway.app"));
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|origin| !origin.is_empty()));
        assert!(list.contains("https://api.up.railway.app"));
    }

    #[test]
    fn allow_list_drops_blank_entries() {
        let list = AllowList::from_urls("  ", Some(""));
        assert!(list.is_empty());
    }
}
