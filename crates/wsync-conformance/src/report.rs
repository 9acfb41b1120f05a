//! Suite results

use crate::simulator::SimulatorReport;
use serde::Serialize;

/// Result of one fixture check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub kind: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckOutcome {
    #[must_use]
    pub fn pass(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            passed: true,
            detail: None,
        }
    }

    #[must_use]
    pub fn fail(name: &str, kind: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// Fixture checks plus any simulator runs
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConformanceReport {
    pub checks: Vec<CheckOutcome>,
    pub simulations: Vec<SimulatorReport>,
}

impl ConformanceReport {
    #[must_use]
    pub fn new(checks: Vec<CheckOutcome>) -> Self {
        Self {
            checks,
            simulations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_simulation(mut self, report: SimulatorReport) -> Self {
        self.simulations.push(report);
        self
    }

    #[must_use]
    pub fn failed_checks(&self) -> Vec<&CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// Every check and every simulation passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.simulations.iter().all(SimulatorReport::passed)
    }

    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        if !self.checks.is_empty() {
            report.push_str("=== wsync Conformance Report ===\n\n");
            for check in &self.checks {
                let mark = if check.passed { "PASS" } else { "FAIL" };
                report.push_str(&format!("[{mark}] {} ({})\n", check.name, check.kind));
                if let Some(detail) = &check.detail {
                    report.push_str(&format!("       {detail}\n"));
                }
            }
            let failed = self.failed_checks().len();
            report.push_str(&format!(
                "\nChecks: {} passed, {failed} failed\n",
                self.checks.len() - failed
            ));
        }
        for simulation in &self.simulations {
            report.push('\n');
            report.push_str(&simulation.generate_text());
        }
        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        report
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_failed_check_fails_the_report() {
        let report = ConformanceReport::new(vec![
            CheckOutcome::pass("handshake", "handshake"),
            CheckOutcome::fail("heartbeat", "heartbeat", "nonce mismatch for pair index 0"),
        ]);
        assert!(!report.passed());
        let text = report.generate_text();
        assert!(text.contains("[FAIL] heartbeat (heartbeat)"));
        assert!(text.contains("Checks: 1 passed, 1 failed"));
    }

    #[test]
    fn json_omits_empty_detail() {
        let report = ConformanceReport::new(vec![CheckOutcome::pass("handshake", "handshake")]);
        let json = report.to_json().unwrap();
        assert!(!json.contains("detail"));
        assert!(json.contains("\"simulations\": []"));
    }
}
