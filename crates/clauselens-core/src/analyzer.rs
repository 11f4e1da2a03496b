//! Analysis producer seam
//!
//! The stage runner asks an [`AnalysisProducer`] for the finished result
//! when a document reaches its terminal stage. The default
//! [`CannedAnalyzer`] returns a fixed review regardless of document
//! content; a real extraction pipeline would slot in behind the same
//! trait.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::types::{Analysis, ClauseFinding, Document};

#[async_trait]
pub trait AnalysisProducer: Send + Sync {
    async fn produce(&self, document: &Document) -> Result<Analysis>;
}

/// Produces the fixed demo review: three clause findings, overall risk 4.3,
/// compliance 78, three missing standard clauses.
#[derive(Default)]
pub struct CannedAnalyzer;

#[async_trait]
impl AnalysisProducer for CannedAnalyzer {
    async fn produce(&self, document: &Document) -> Result<Analysis> {
        Ok(canned_analysis(&document.id))
    }
}

/// The fixed analysis payload, shared with tests.
pub fn canned_analysis(document_id: &str) -> Analysis {
    Analysis {
        document_id: document_id.to_string(),
        clauses: vec![
            ClauseFinding {
                id: "clause-1".into(),
                category: "Limitation of Liability".into(),
                excerpt: "In no event shall either party's aggregate liability exceed \
                          the fees paid in the twelve (12) months preceding the claim."
                    .into(),
                risk_score: 7,
                explanation: "The liability cap is mutual but excludes no carve-outs; \
                              breaches of confidentiality or IP indemnity would also be \
                              capped at trailing fees."
                    .into(),
                suggestions: vec![
                    "Carve out confidentiality breaches and IP infringement from the cap".into(),
                    "Raise the cap to a fixed multiple of annual fees".into(),
                ],
            },
            ClauseFinding {
                id: "clause-2".into(),
                category: "Automatic Renewal".into(),
                excerpt: "This Agreement shall automatically renew for successive \
                          one-year terms unless either party gives notice at least \
                          ninety (90) days prior to expiration."
                    .into(),
                risk_score: 4,
                explanation: "A 90-day notice window is longer than market standard and \
                              is easy to miss without a contract calendar."
                    .into(),
                suggestions: vec![
                    "Shorten the non-renewal notice window to 30 days".into(),
                    "Add a renewal reminder obligation on the counterparty".into(),
                ],
            },
            ClauseFinding {
                id: "clause-3".into(),
                category: "Indemnification".into(),
                excerpt: "Customer shall indemnify, defend and hold harmless Provider \
                          from any and all claims arising out of Customer's use of the \
                          Services."
                    .into(),
                risk_score: 6,
                explanation: "Indemnity is one-sided and unbounded; \"any and all \
                              claims\" reaches beyond third-party claims."
                    .into(),
                suggestions: vec![
                    "Make the indemnity mutual".into(),
                    "Limit the indemnity to third-party claims".into(),
                    "Tie indemnity exposure to the liability cap".into(),
                ],
            },
        ],
        summary: "Moderate-risk commercial agreement. The liability cap and one-sided \
                  indemnity concentrate risk on the customer, and several standard \
                  protective clauses are absent."
            .into(),
        overall_risk_score: 4.3,
        missing_clauses: vec![
            "Force Majeure".into(),
            "Dispute Resolution".into(),
            "Governing Law".into(),
        ],
        compliance_score: 78,
        completed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisStatus;
    use pretty_assertions::assert_eq;

    fn sample_document() -> Document {
        Document {
            id: "doc-1".into(),
            owner_id: "user-a".into(),
            name: "contract.pdf".into(),
            storage_path: "user-a/x/contract.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 2048,
            created_at: Utc::now(),
            analysis_status: AnalysisStatus::Analyzing,
            analysis_progress: 75,
        }
    }

    #[tokio::test]
    async fn canned_result_has_fixed_shape() {
        let analysis = CannedAnalyzer.produce(&sample_document()).await.unwrap();

        assert_eq!(analysis.document_id, "doc-1");
        assert_eq!(analysis.clauses.len(), 3);
        assert_eq!(analysis.overall_risk_score, 4.3);
        assert_eq!(analysis.compliance_score, 78);
        for clause in ["Force Majeure", "Dispute Resolution", "Governing Law"] {
            assert!(
                analysis.missing_clauses.iter().any(|c| c == clause),
                "missing clause '{clause}' should be reported"
            );
        }
    }

    #[tokio::test]
    async fn clause_scores_stay_in_range() {
        let analysis = CannedAnalyzer.produce(&sample_document()).await.unwrap();
        for clause in &analysis.clauses {
            assert!((0..=10).contains(&clause.risk_score));
            assert!(!clause.suggestions.is_empty());
            assert!(!clause.excerpt.is_empty());
        }
        assert!((0.0..=10.0).contains(&analysis.overall_risk_score));
        assert!((0..=100).contains(&analysis.compliance_score));
    }
}
