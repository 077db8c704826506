/**
 * MÉTRIQUES DÉRIVÉES - Vues calculées à la lecture, jamais persistées
 *
 * RÔLE :
 * Transforme les compteurs bruts d'un service en pourcentages pour les
 * graphiques (notation pouce haut/neutre/bas, taux d'usage vs rejets).
 *
 * FONCTIONNEMENT :
 * - Fonctions pures des compteurs stockés, recalculées à chaque appel
 * - Total nul => toutes les valeurs à 0 (jamais de division par zéro ni de NaN)
 */

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Service, ServiceMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingView {
    pub thumb_up: f64,
    pub neutral: f64,
    pub thumb_down: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageView {
    pub usage_rate: f64,
}

/// Compteurs bruts exposés par `GET /metrics/{serviceName}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub thumbs_up_total: u64,
    pub neutral_total: u64,
    pub thumbs_down_total: u64,
    pub usage_total: u64,
    pub rejection_total: u64,
}

impl From<&ServiceMetrics> for MetricsSnapshot {
    fn from(m: &ServiceMetrics) -> Self {
        Self {
            thumbs_up_total: m.thumbs_up_total,
            neutral_total: m.neutral_total,
            thumbs_down_total: m.thumbs_down_total,
            usage_total: m.usage_total,
            rejection_total: m.rejection_total,
        }
    }
}

pub type FeedbackMetricsSummary = BTreeMap<String, MetricsSnapshot>;

fn percent(part: u64, total: u128) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * part as f64 / total as f64
}

pub fn rating_view(up: u64, neutral: u64, down: u64) -> RatingView {
    // u128 : la somme de trois u64 ne déborde pas
    let total = up as u128 + neutral as u128 + down as u128;
    RatingView {
        thumb_up: percent(up, total),
        neutral: percent(neutral, total),
        thumb_down: percent(down, total),
    }
}

pub fn usage_view(usage: u64, rejection: u64) -> UsageView {
    let total = usage as u128 + rejection as u128;
    UsageView { usage_rate: percent(usage, total) }
}

pub fn ratings_of(metrics: &ServiceMetrics) -> RatingView {
    rating_view(metrics.thumbs_up_total, metrics.neutral_total, metrics.thumbs_down_total)
}

pub fn usage_of(metrics: &ServiceMetrics) -> UsageView {
    usage_view(metrics.usage_total, metrics.rejection_total)
}

/// Agrège les compteurs bruts de tous les services, indexés par nom.
pub fn summarize<'a>(services: impl IntoIterator<Item = &'a Service>) -> FeedbackMetricsSummary {
    services
        .into_iter()
        .map(|s| (s.name.clone(), MetricsSnapshot::from(&s.metrics)))
        .collect()
}
