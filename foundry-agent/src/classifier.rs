//! Rule-based safety classification for build prompts and generated source.
//!
//! Classification is deterministic: a fixed denylist denies outright, a
//! fixed pattern table flags for human review, and only when neither fires
//! does an optional semantic analyzer get a say. The analyzer's failure
//! modes never block classification; the rules always produce a verdict.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::analysis::SemanticAnalyzer;
use crate::verdict::Verdict;

/// Terms that permanently deny a prompt, matched as case-insensitive
/// substrings.
const DANGEROUS_KEYWORDS: &[&str] = &[
    "malware",
    "ransomware",
    "keylogger",
    "virus",
    "trojan",
    "rootkit",
    "botnet",
    "ddos",
    "denial of service",
    "exploit",
    "vulnerability scanner",
    "password cracker",
    "credential harvester",
    "phishing",
    "spyware",
    "backdoor",
    "remote access trojan",
    "rat",
    "cryptominer",
    "crypto miner",
];

/// Patterns that flag a prompt for human review. All matches accumulate.
const REVIEW_PATTERNS: &[&str] = &[
    r"access.*system\s+files?",
    r"modify.*registry",
    r"delete.*files?",
    r"encrypt.*files?",
    r"send.*data.*server",
    r"record.*keystrokes?",
    r"capture.*screen",
    r"access.*camera",
    r"access.*microphone",
    r"hidden.*process",
    r"run.*background.*undetected",
    r"bypass.*security",
    r"disable.*antivirus",
    r"elevate.*privileges?",
    r"admin.*access",
    r"root.*access",
];

/// Imports that flag generated source for review before publication.
const SUSPICIOUS_CODE_IMPORTS: &[&str] = &[
    "subprocess",
    "os.system",
    "eval",
    "exec",
    "__import__",
    "ctypes",
    "win32api",
];

fn review_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        REVIEW_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("review pattern must compile"))
            .collect()
    })
}

/// The safety gate in front of build approval and publication.
#[derive(Default)]
pub struct SafetyClassifier {
    analyzer: Option<Arc<dyn SemanticAnalyzer>>,
}

impl SafetyClassifier {
    /// Rule-only classifier.
    pub fn new() -> Self {
        Self { analyzer: None }
    }

    /// Adds a semantic analyzer consulted when no rule fires.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn SemanticAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Classifies a request's title and prompt.
    ///
    /// Denylist hits deny regardless of anything else; pattern matches
    /// accumulate into one needs-review verdict; the analyzer, when
    /// configured and conclusive, decides the remaining cases.
    pub async fn classify_prompt(&self, title: &str, prompt: &str) -> Verdict {
        let text = format!("{} {}", title, prompt).to_lowercase();

        for keyword in DANGEROUS_KEYWORDS {
            if text.contains(keyword) {
                debug!(keyword, "denylist keyword matched");
                return Verdict::unsafe_with(format!("contains dangerous keyword: {}", keyword));
            }
        }

        let mut reasons = Vec::new();
        for pattern in review_patterns() {
            if pattern.is_match(&text) {
                reasons.push(format!("matches suspicious pattern: {}", pattern.as_str()));
            }
        }
        if !reasons.is_empty() {
            debug!(matches = reasons.len(), "review patterns matched");
            return Verdict::needs_review(reasons);
        }

        if let Some(analyzer) = &self.analyzer {
            if analyzer.is_available().await {
                match analyzer.analyze(&text).await {
                    Ok(Some(verdict)) => {
                        debug!(analyzer = analyzer.id(), level = %verdict.level, "semantic verdict");
                        return verdict;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(analyzer = analyzer.id(), error = %e, "semantic analysis failed, keeping rule verdict");
                    }
                }
            }
        }

        Verdict::safe()
    }

    /// Classifies generated source text before it ships. A much smaller
    /// denylist; hits demand review rather than denying outright.
    pub fn classify_code(&self, source: &str) -> Verdict {
        let lowered = source.to_lowercase();
        let mut reasons = Vec::new();
        for import in SUSPICIOUS_CODE_IMPORTS {
            if lowered.contains(import) {
                reasons.push(format!("code uses potentially dangerous import: {}", import));
            }
        }
        if !reasons.is_empty() {
            return Verdict::needs_review(reasons);
        }
        Verdict::safe_with("code passed basic safety checks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MockAnalyzer;
    use crate::verdict::SafetyLevel;

    #[tokio::test]
    async fn test_clean_prompt_is_safe() {
        let classifier = SafetyClassifier::new();
        let verdict = classifier
            .classify_prompt("Weather Widget", "A desktop widget showing the local forecast")
            .await;
        assert_eq!(verdict.level, SafetyLevel::Safe);
        assert_eq!(verdict.score, 1.0);
        assert!(!verdict.needs_human_review);
        assert_eq!(verdict.reasons, vec!["passed all safety checks"]);
    }

    #[tokio::test]
    async fn test_denylist_denies() {
        let classifier = SafetyClassifier::new();
        let verdict = classifier
            .classify_prompt("Helper", "Build me ransomware that encrypts files")
            .await;
        assert_eq!(verdict.level, SafetyLevel::Unsafe);
        assert_eq!(verdict.score, 0.0);
        assert_eq!(
            verdict.reasons,
            vec!["contains dangerous keyword: ransomware"]
        );
    }

    #[tokio::test]
    async fn test_denylist_wins_over_patterns() {
        // Both a keyword and several review patterns are present; the
        // keyword short-circuits so exactly one reason comes back.
        let classifier = SafetyClassifier::new();
        let verdict = classifier
            .classify_prompt(
                "Cleaner",
                "malware that will delete files and bypass security",
            )
            .await;
        assert_eq!(verdict.level, SafetyLevel::Unsafe);
        assert_eq!(verdict.reasons.len(), 1);
    }

    #[tokio::test]
    async fn test_patterns_accumulate() {
        let classifier = SafetyClassifier::new();
        let verdict = classifier
            .classify_prompt(
                "Utility",
                "An app to capture screen output and access camera input",
            )
            .await;
        assert_eq!(verdict.level, SafetyLevel::NeedsReview);
        assert_eq!(verdict.score, 0.5);
        assert!(verdict.needs_human_review);
        assert_eq!(verdict.reasons.len(), 2);
    }

    #[tokio::test]
    async fn test_keyword_matches_are_substrings() {
        let classifier = SafetyClassifier::new();
        let verdict = classifier
            .classify_prompt("Tool", "An antivirus companion")
            .await;
        // "virus" is inside "antivirus"; the denylist is deliberately blunt.
        assert_eq!(verdict.level, SafetyLevel::Unsafe);
    }

    #[tokio::test]
    async fn test_semantic_verdict_is_authoritative() {
        let analyzer = Arc::new(
            MockAnalyzer::new().with_verdict(Verdict::unsafe_with("obfuscated intent detected")),
        );
        let classifier = SafetyClassifier::new().with_analyzer(analyzer.clone());
        let verdict = classifier
            .classify_prompt("Innocent looking", "A simple note taking app")
            .await;
        assert_eq!(verdict.level, SafetyLevel::Unsafe);
        assert_eq!(analyzer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_semantic_abstention_falls_through() {
        let analyzer = Arc::new(MockAnalyzer::new());
        let classifier = SafetyClassifier::new().with_analyzer(analyzer.clone());
        let verdict = classifier
            .classify_prompt("Notes", "A simple note taking app")
            .await;
        assert_eq!(verdict.level, SafetyLevel::Safe);
        assert_eq!(analyzer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_analyzer_is_skipped() {
        let analyzer = Arc::new(
            MockAnalyzer::new()
                .with_verdict(Verdict::unsafe_with("should never be consulted"))
                .with_available(false),
        );
        let classifier = SafetyClassifier::new().with_analyzer(analyzer.clone());
        let verdict = classifier
            .classify_prompt("Notes", "A simple note taking app")
            .await;
        assert_eq!(verdict.level, SafetyLevel::Safe);
        assert_eq!(analyzer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rules_run_before_semantics() {
        // A denylist hit must never reach the analyzer.
        let analyzer = Arc::new(MockAnalyzer::new().with_verdict(Verdict::safe()));
        let classifier = SafetyClassifier::new().with_analyzer(analyzer.clone());
        let verdict = classifier
            .classify_prompt("Tool", "keylogger for my own keyboard")
            .await;
        assert_eq!(verdict.level, SafetyLevel::Unsafe);
        assert_eq!(analyzer.call_count(), 0);
    }

    #[test]
    fn test_code_check_flags_imports() {
        let classifier = SafetyClassifier::new();
        let verdict =
            classifier.classify_code("import subprocess\nsubprocess.run(['ls'])\neval(data)");
        assert_eq!(verdict.level, SafetyLevel::NeedsReview);
        assert_eq!(verdict.reasons.len(), 2);
    }

    #[test]
    fn test_code_check_passes_clean_source() {
        let classifier = SafetyClassifier::new();
        let verdict = classifier.classify_code("import QtQuick\nRectangle { width: 100 }");
        assert_eq!(verdict.level, SafetyLevel::Safe);
        assert_eq!(verdict.reasons, vec!["code passed basic safety checks"]);
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(review_patterns().len(), 16);
    }
}
