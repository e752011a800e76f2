//! Text and JSON rendering of a walked session

use quire_core::session::RegionSummary;
use quire_core::{DiffState, JobKind, SessionStatus};
use serde::Serialize;
use std::fmt::Write as _;

/// Everything a run prints
#[derive(Debug, Serialize)]
pub struct Report {
    pub status: SessionStatus,
    /// 1-based numbers of the regions navigation stopped at
    pub visited: Vec<usize>,
}

impl Report {
    pub fn new(status: SessionStatus, visited: Vec<usize>) -> Self {
        Self { status, visited }
    }

    pub fn visited_regions(&self) -> impl Iterator<Item = &RegionSummary> {
        self.visited
            .iter()
            .filter_map(|&n| self.status.summaries.get(n.wrapping_sub(1)))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let total = self.status.regions;
        let shown = self.visited.len();
        if total == 0 {
            let _ = writeln!(out, "{}: no differences", self.status.name);
            return out;
        }
        if shown == total {
            let _ = writeln!(out, "{}: {total} regions", self.status.name);
        } else {
            let _ = writeln!(out, "{}: {shown} of {total} regions", self.status.name);
        }

        for region in self.visited_regions() {
            let _ = write!(out, "{:>4}", region.number);
            for lines in &region.lines {
                let _ = write!(
                    out,
                    "  {}:{},{}",
                    lines.variant, lines.first_line, lines.line_count
                );
            }
            let _ = write!(out, "  [{}]", self.state_label(region));
            if region.clash {
                let _ = write!(out, " clash");
            }
            out.push('\n');
        }
        out
    }

    fn state_label(&self, region: &RegionSummary) -> String {
        if let Some(state) = region.merge_state {
            return state.label().to_string();
        }
        match (self.status.job, region.diff_state) {
            (JobKind::Compare3, DiffState::AllEqual) => "all-equal".to_string(),
            (JobKind::Compare3, DiffState::Odd(variant)) => format!("odd-{variant}"),
            _ => "differ".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_core::{Session, Step, Variant};

    fn walked(session: &mut Session) -> Report {
        let mut visited = Vec::new();
        while let Ok(Step::Moved(n)) = session.next(1) {
            visited.push(n + 1);
        }
        Report::new(session.status(), visited)
    }

    #[test]
    fn test_text_report_lists_regions() {
        let mut session = Session::builder(JobKind::Compare2)
            .name("a.txt b.txt")
            .text(Variant::A, "h0\nold\nh1\n")
            .text(Variant::B, "h0\nnew\nnewer\nh1\n")
            .start()
            .unwrap();
        let report = walked(&mut session);
        assert_eq!(
            report.to_text(),
            "a.txt b.txt: 1 regions\n   1  A:2,1  B:2,2  [differ]\n"
        );
    }

    #[test]
    fn test_merge_report_shows_state_and_clash() {
        let mut session = Session::builder(JobKind::MergeWithAncestor)
            .name("merge")
            .text(Variant::A, "h0\nmine\nh1\n")
            .text(Variant::B, "h0\ntheirs\nh1\n")
            .text(Variant::Ancestor, "h0\nbase\nh1\n")
            .start()
            .unwrap();
        let report = walked(&mut session);
        let text = report.to_text();
        assert!(text.contains("[conflict] clash"));
        assert!(text.contains("Ancestor:2,1"));
    }

    #[test]
    fn test_json_report() {
        let mut session = Session::builder(JobKind::Compare2)
            .text(Variant::A, "x\n")
            .text(Variant::B, "y\n")
            .start()
            .unwrap();
        let report = walked(&mut session);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["visited"], serde_json::json!([1]));
        assert_eq!(value["status"]["regions"], 1);
        assert_eq!(value["status"]["summaries"][0]["number"], 1);
    }

    #[test]
    fn test_empty_report() {
        let mut session = Session::builder(JobKind::Compare2)
            .name("same")
            .text(Variant::A, "x\n")
            .text(Variant::B, "x\n")
            .start()
            .unwrap();
        let report = walked(&mut session);
        assert_eq!(report.to_text(), "same: no differences\n");
    }
}
