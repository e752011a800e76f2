//! Running the system `diff` and `diff3` programs

use crate::diff::{align, DiffBackend, DiffOptions, DiffToolError, PairHunk, RegionCorrespondence};
use crate::span::LineRange;
use crate::variant::{Variant, VariantMap};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

/// Diff backend delegating to external programs.
///
/// Each invocation writes its inputs to temporary files inside a private
/// directory; the files are gone once the call returns, whatever the
/// outcome. [`DiffBackend::cleanup`] removes the directory itself.
#[derive(Debug)]
pub struct ExternalDiff {
    diff_program: String,
    diff3_program: String,
    options: DiffOptions,
    dir: Option<TempDir>,
}

impl Default for ExternalDiff {
    fn default() -> Self {
        Self {
            diff_program: "diff".to_string(),
            diff3_program: "diff3".to_string(),
            options: DiffOptions::default(),
            dir: None,
        }
    }
}

impl ExternalDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_programs(mut self, diff: impl Into<String>, diff3: impl Into<String>) -> Self {
        self.diff_program = diff.into();
        self.diff3_program = diff3.into();
        self
    }

    pub fn with_options(mut self, options: DiffOptions) -> Self {
        self.options = options;
        self
    }

    /// Directory holding the per-call input files, if created yet
    pub fn work_dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    fn ensure_dir(&mut self) -> Result<&Path, DiffToolError> {
        let dir = match self.dir.take() {
            Some(dir) => dir,
            None => tempfile::Builder::new().prefix("quire-").tempdir()?,
        };
        Ok(self.dir.insert(dir).path())
    }

    fn input_file(dir: &Path, variant: Variant, text: &str) -> Result<NamedTempFile, DiffToolError> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}-", variant.label()))
            .tempfile_in(dir)?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(file)
    }

    /// Run `program` over `texts`; exit status 0 and 1 are success
    fn run(
        &mut self,
        program: &str,
        flags: &[&str],
        texts: &[(Variant, &str)],
    ) -> Result<String, DiffToolError> {
        let dir = self.ensure_dir()?.to_path_buf();
        // Dropping the handles deletes the files on every path out of here
        let files = texts
            .iter()
            .map(|(variant, text)| Self::input_file(&dir, *variant, text))
            .collect::<Result<Vec<_>, _>>()?;

        let output = Command::new(program)
            .args(flags)
            .args(files.iter().map(NamedTempFile::path))
            .output()
            .map_err(|source| DiffToolError::Spawn {
                program: program.to_string(),
                source,
            })?;

        match output.status.code() {
            Some(0) | Some(1) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            _ => Err(DiffToolError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    fn diff_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.options.ignore_whitespace {
            flags.push("-w");
        }
        if self.options.ignore_case {
            flags.push("-i");
        }
        flags
    }

    fn pairwise(&mut self, texts: &[(Variant, &str)]) -> Result<Vec<RegionCorrespondence>, DiffToolError> {
        let program = self.diff_program.clone();
        let flags = self.diff_flags();
        let mut pairs = Vec::with_capacity(texts.len() - 1);
        for other in &texts[1..] {
            let out = self.run(&program, &flags, &[texts[0], *other])?;
            pairs.push(parse_normal(&program, &out)?);
        }
        let variants: Vec<Variant> = texts.iter().map(|(v, _)| *v).collect();
        Ok(align(&variants, &pairs))
    }
}

impl DiffBackend for ExternalDiff {
    fn compute(
        &mut self,
        texts: &[(Variant, &str)],
    ) -> Result<Vec<RegionCorrespondence>, DiffToolError> {
        match texts.len() {
            // diff3 has no whitespace or case folding; fall back to pairwise runs
            3 if self.options == DiffOptions::default() => {
                let program = self.diff3_program.clone();
                let out = self.run(&program, &[], texts)?;
                let variants = [texts[0].0, texts[1].0, texts[2].0];
                parse_diff3(&program, &out, variants)
            }
            2..=4 => self.pairwise(texts),
            n => Err(DiffToolError::Arity(n)),
        }
    }

    fn cleanup(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::warn!("failed to remove {}: {}", path.display(), e);
            }
        }
    }

    fn name(&self) -> &str {
        &self.diff_program
    }
}

impl Drop for ExternalDiff {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn parse_error(program: &str, line: usize, message: impl Into<String>) -> DiffToolError {
    DiffToolError::Parse {
        program: program.to_string(),
        line: line + 1,
        message: message.into(),
    }
}

/// Parse "N" or "N,M" (1-based, inclusive)
fn parse_lines(spec: &str) -> Option<(usize, usize)> {
    match spec.split_once(',') {
        Some((a, b)) => Some((a.parse().ok()?, b.parse().ok()?)),
        None => {
            let n = spec.parse().ok()?;
            Some((n, n))
        }
    }
}

/// Parse normal-format `diff` output into 0-based hunks
pub fn parse_normal(program: &str, output: &str) -> Result<Vec<PairHunk>, DiffToolError> {
    let mut hunks = Vec::new();
    for (idx, line) in output.lines().enumerate() {
        if line.is_empty() || line.starts_with(['<', '>', '-', '\\']) {
            continue;
        }
        let Some(pos) = line.find(['a', 'c', 'd']) else {
            return Err(parse_error(program, idx, format!("unexpected line {line:?}")));
        };
        let (left, right) = (&line[..pos], &line[pos + 1..]);
        let (Some((l1, l2)), Some((r1, r2))) = (parse_lines(left), parse_lines(right)) else {
            return Err(parse_error(program, idx, format!("bad line numbers in {line:?}")));
        };
        let hunk = match &line[pos..pos + 1] {
            "a" => PairHunk::new(l1..l1, r1.saturating_sub(1)..r2),
            "d" => PairHunk::new(l1.saturating_sub(1)..l2, r1..r1),
            _ => PairHunk::new(l1.saturating_sub(1)..l2, r1.saturating_sub(1)..r2),
        };
        hunks.push(hunk);
    }
    Ok(hunks)
}

/// Parse `diff3` output into three-variant regions, in file order
pub fn parse_diff3(
    program: &str,
    output: &str,
    variants: [Variant; 3],
) -> Result<Vec<RegionCorrespondence>, DiffToolError> {
    let mut regions = Vec::new();
    let mut current: Option<VariantMap<LineRange>> = None;

    for (idx, line) in output.lines().enumerate() {
        if line.starts_with("====") {
            if let Some(done) = current.take() {
                regions.push(finish(program, idx, done, &variants)?);
            }
            current = Some(VariantMap::new());
            continue;
        }
        let bytes = line.as_bytes();
        let is_file_line = bytes.len() >= 3 && matches!(bytes[0], b'1'..=b'3') && bytes[1] == b':';
        if !is_file_line {
            continue;
        }
        let Some(lines) = current.as_mut() else {
            return Err(parse_error(program, idx, "file line before any ==== header"));
        };
        let file = usize::from(bytes[0] - b'1');
        let body = &line[2..];
        let range = if let Some(spec) = body.strip_suffix('a') {
            let n: usize = spec
                .parse()
                .map_err(|_| parse_error(program, idx, format!("bad line number in {line:?}")))?;
            LineRange::empty(n)
        } else if let Some(spec) = body.strip_suffix('c') {
            let (start, end) = parse_lines(spec)
                .ok_or_else(|| parse_error(program, idx, format!("bad line numbers in {line:?}")))?;
            LineRange::new(start.saturating_sub(1), end)
        } else {
            return Err(parse_error(program, idx, format!("unexpected command in {line:?}")));
        };
        lines.insert(variants[file], range);
    }
    if let Some(done) = current.take() {
        regions.push(finish(program, output.lines().count(), done, &variants)?);
    }
    Ok(regions)
}

fn finish(
    program: &str,
    idx: usize,
    lines: VariantMap<LineRange>,
    variants: &[Variant; 3],
) -> Result<RegionCorrespondence, DiffToolError> {
    if let Some(missing) = variants.iter().find(|v| !lines.contains(**v)) {
        return Err(parse_error(
            program,
            idx,
            format!("hunk lacks a range for variant {missing}"),
        ));
    }
    Ok(RegionCorrespondence::new(lines))
}
