/**
 * SEED - Données de démonstration pour un registre vide
 *
 * Enregistre quelques services d'exemple avec jauges réalistes et compteurs
 * aléatoires bornés, plus un petit jeu de feedback. Passe par les opérations
 * du registre : les invariants (noms uniques, replicas) tiennent.
 */

use rand::Rng;
use tracing::info;

use crate::auth::Caller;
use crate::feedback::{FeedbackLog, NewFeedback};
use crate::models::{GaugePatch, InstanceSpec, MetricsPatch, NewService, ServiceStatus};
use crate::registry::{RegistryError, ServiceRegistry};

struct DemoService {
    name: &'static str,
    service_type: &'static str,
    framework: &'static str,
    version: &'static str,
    description: &'static str,
    status: ServiceStatus,
    replicas: u16,
    // cpu %, mem MB, latency ms, accuracy %, availability %, req/s, error %, drift
    gauges: [f64; 8],
}

const DEMO_SERVICES: &[DemoService] = &[
    DemoService {
        name: "AI Model A",
        service_type: "classification",
        framework: "tensorflow",
        version: "2.1",
        description: "Image classification service for product categorization",
        status: ServiceStatus::Active,
        replicas: 2,
        gauges: [15.0, 1200.0, 0.5, 98.0, 99.9, 250.0, 1.5, 0.02],
    },
    DemoService {
        name: "AI Model B",
        service_type: "nlp",
        framework: "pytorch",
        version: "1.3",
        description: "NLP model for sentiment analysis",
        status: ServiceStatus::Active,
        replicas: 3,
        gauges: [30.0, 800.0, 0.3, 95.0, 99.8, 300.0, 0.5, 0.01],
    },
    DemoService {
        name: "AI Model C",
        service_type: "detection",
        framework: "keras",
        version: "1.0",
        description: "Object detection service for security applications",
        status: ServiceStatus::Maintenance,
        replicas: 1,
        gauges: [45.0, 2500.0, 1.2, 97.0, 99.5, 150.0, 2.0, 0.03],
    },
    DemoService {
        name: "AI Model D",
        service_type: "segmentation",
        framework: "tensorflow",
        version: "3.0",
        description: "Image segmentation model for medical applications",
        status: ServiceStatus::Inactive,
        replicas: 0,
        gauges: [60.0, 3200.0, 2.1, 99.0, 98.5, 100.0, 0.8, 0.015],
    },
    DemoService {
        name: "AI Model E",
        service_type: "generation",
        framework: "huggingface",
        version: "1.5",
        description: "Text generation service for content creation",
        status: ServiceStatus::Error,
        replicas: 1,
        gauges: [75.0, 4000.0, 3.0, 92.0, 97.0, 50.0, 3.5, 0.05],
    },
];

// (message, intention, qualité, index du service)
const DEMO_FEEDBACK: &[(&str, &str, &str, usize)] = &[
    ("My login doesn't work, please help.", "account_login_issue", "good", 1),
    ("How can I reset my password?", "password_reset_query", "bad", 1),
    ("I think the reporting feature has a bug.", "bug_report_reporting", "good", 0),
    ("Can you explain the billing cycle?", "billing_cycle_explanation_request", "bad", 1),
    ("Thanks for the quick support!", "positive_feedback_support", "bad", 1),
    ("The dashboard is loading very slowly today.", "performance_issue_dashboard", "bad", 2),
    ("Where can I find the documentation for the API?", "documentation_request_api", "bad", 4),
    ("Feature request: Can we export data to CSV?", "feature_request_export_csv", "bad", 0),
    ("My payment failed, what should I do?", "payment_failed_issue", "good", 4),
];

fn demo_metrics(gauges: [f64; 8]) -> MetricsPatch {
    let mut rng = rand::thread_rng();
    let usage = rng.gen_range(500..5_000);
    MetricsPatch {
        usage_total: usage,
        rejection_total: rng.gen_range(0..usage / 4),
        thumbs_up_total: rng.gen_range(50..400),
        neutral_total: rng.gen_range(0..80),
        thumbs_down_total: rng.gen_range(0..120),
        gauges: GaugePatch {
            cpu_percent: Some(gauges[0]),
            mem_mb: Some(gauges[1]),
            latency_ms: Some(gauges[2]),
            accuracy_percent: Some(gauges[3]),
            availability_percent: Some(gauges[4]),
            throughput_rps: Some(gauges[5]),
            error_rate_percent: Some(gauges[6]),
            drift_score: Some(gauges[7]),
        },
    }
}

/// Ne fait rien si le registre contient déjà des services.
pub fn seed_demo_data(registry: &ServiceRegistry, feedback: &FeedbackLog) -> Result<usize, RegistryError> {
    let caller = Caller::system();
    if !registry.list_services(&caller)?.is_empty() {
        info!("[seed] registry not empty, skipping demo data");
        return Ok(0);
    }

    for (idx, demo) in DEMO_SERVICES.iter().enumerate() {
        let instances = (0..demo.replicas)
            .map(|r| InstanceSpec::new(&format!("10.0.{idx}.{}", r + 10), 8000 + i64::from(r), "/predict"))
            .collect();
        let svc = registry.create_service(
            &caller,
            NewService {
                name: demo.name.into(),
                service_type: demo.service_type.into(),
                framework: demo.framework.into(),
                version: demo.version.into(),
                description: demo.description.into(),
                status: Some(demo.status),
                instances,
            },
        )?;
        registry.record_metrics(&caller, &svc.id, demo_metrics(demo.gauges))?;
    }

    if feedback.is_empty() {
        for (initial, tokenized, quality, svc) in DEMO_FEEDBACK {
            feedback.append(NewFeedback {
                initial: (*initial).into(),
                tokenized: (*tokenized).into(),
                userfeedback: (*quality).into(),
                service: Some(DEMO_SERVICES[*svc].name.into()),
            })?;
        }
    }

    info!(services = DEMO_SERVICES.len(), "[seed] demo data registered");
    Ok(DEMO_SERVICES.len())
}
