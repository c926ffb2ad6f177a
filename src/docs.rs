//! Docs-lookup collaborator: read-only Azure documentation queries used
//! by agents to ground architectural decisions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocsArticle {
    pub title: String,
    pub url: String,
    pub excerpt: String,
}

#[async_trait]
pub trait DocsLookup: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<DocsArticle>>;
}

/// Canned-article lookup for tests and offline runs. Returns articles
/// whose title or excerpt contains the query, case-insensitively.
#[derive(Debug, Default)]
pub struct StaticDocsLookup {
    articles: Vec<DocsArticle>,
}

impl StaticDocsLookup {
    pub fn new(articles: Vec<DocsArticle>) -> Self {
        Self { articles }
    }

    /// A small default corpus covering the services the Design phase
    /// reaches for most often.
    pub fn with_default_corpus() -> Self {
        let article = |title: &str, url: &str, excerpt: &str| DocsArticle {
            title: title.to_string(),
            url: url.to_string(),
            excerpt: excerpt.to_string(),
        };
        Self::new(vec![
            article(
                "Azure Kubernetes Service ingress with Application Gateway",
                "https://learn.microsoft.com/azure/application-gateway/ingress-controller-overview",
                "AGIC replaces cloud-specific ingress classes such as alb",
            ),
            article(
                "AKS load balancing",
                "https://learn.microsoft.com/azure/aks/load-balancer-standard",
                "Service type LoadBalancer provisions an Azure Standard Load Balancer",
            ),
            article(
                "Workload identity on AKS",
                "https://learn.microsoft.com/azure/aks/workload-identity-overview",
                "Replaces IRSA and GKE workload identity bindings",
            ),
        ])
    }
}

#[async_trait]
impl DocsLookup for StaticDocsLookup {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<DocsArticle>> {
        let query = query.to_lowercase();
        Ok(self
            .articles
            .iter()
            .filter(|a| {
                a.title.to_lowercase().contains(&query)
                    || a.excerpt.to_lowercase().contains(&query)
            })
            .cloned()
            .collect())
    }
}
