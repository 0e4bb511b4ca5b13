use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};

use super::types::{Command, Step};

/// Feature label applied before any `# FITUR:` marker is seen
pub const DEFAULT_FEATURE: &str = "Umum";

/// Command prefix table: keyword, command, required quoted-argument count.
/// Prefixes are matched case-insensitively at line start; more specific
/// prefixes come first.
const COMMAND_TABLE: [(&str, Command, usize); 9] = [
    ("Buka aplikasi", Command::OpenApp, 1),
    ("Ketik", Command::InputText, 2),
    ("Ketuk tombol", Command::Tap, 1),
    ("Tunggu sampai muncul", Command::WaitFor, 1),
    ("HARUS muncul", Command::AssertHard, 1),
    ("Pastikan muncul", Command::AssertSoft, 1),
    ("Gulir ke", Command::Scroll, 1),
    ("SIMPAN teks dari", Command::SaveText, 2),
    ("TEKAN TOMBOL SISTEM", Command::PressKey, 1),
];

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Error on malformed lines, missing includes and unbalanced blocks
    /// instead of warning and skipping
    pub strict: bool,
}

/// Converts scenario text into a lazy stream of [`Step`]s.
///
/// Loop bodies and included files are re-entered through the same parser, so a
/// single instance handles arbitrarily composed scripts.
pub struct ScriptParser {
    options: ParseOptions,
}

impl ScriptParser {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Parse a scenario file. The returned stream is lazy and not
    /// restartable; parse again to re-read from the source.
    pub fn parse_file(&self, path: &Path, feature: &str) -> Result<StepStream> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        Ok(self.parse_lines(text.lines().map(String::from).collect(), base_dir, feature))
    }

    /// Parse an in-memory list of lines, e.g. a conditional body at execution
    /// time. `base_dir` anchors relative include paths.
    pub fn parse_lines(&self, lines: Vec<String>, base_dir: PathBuf, feature: &str) -> StepStream {
        StepStream {
            frames: vec![Frame {
                lines,
                pos: 0,
                base_dir,
            }],
            feature: feature.to_string(),
            strict: self.options.strict,
        }
    }
}

/// One buffered line source: the open scenario file, an included file, or an
/// unrolled loop body.
struct Frame {
    lines: Vec<String>,
    pos: usize,
    base_dir: PathBuf,
}

impl Frame {
    fn next_line(&mut self) -> Option<String> {
        let line = self.lines.get(self.pos)?.clone();
        self.pos += 1;
        Some(line)
    }
}

/// Lazy, finite, non-restartable sequence of steps. Includes and unrolled
/// loops push frames onto an explicit stack, giving depth-first order without
/// recursion-depth surprises.
pub struct StepStream {
    frames: Vec<Frame>,
    feature: String,
    strict: bool,
}

impl StepStream {
    /// Feature label currently in effect, updated as markers are consumed
    pub fn feature(&self) -> &str {
        &self.feature
    }

    fn warn_or_err(&self, message: String) -> Option<Result<Step>> {
        if self.strict {
            Some(Err(anyhow::anyhow!(message)))
        } else {
            log::warn!("{}", message);
            None
        }
    }

    /// Collect verbatim lines from the current frame until `closer`. Nested
    /// openers of the same construct are counted so inner blocks stay inside
    /// the body.
    fn collect_block(&mut self, opener: &str, closer: &str) -> Option<Vec<String>> {
        let frame = self.frames.last_mut()?;
        let mut body = Vec::new();
        let mut depth = 0usize;

        while let Some(line) = frame.next_line() {
            let trimmed = line.trim();
            if starts_with_keyword(trimmed, opener) {
                depth += 1;
            } else if starts_with_keyword(trimmed, closer) {
                if depth == 0 {
                    return Some(body);
                }
                depth -= 1;
            }
            body.push(line);
        }

        None
    }

    fn handle_conditional(&mut self, line: &str) -> Option<Result<Step>> {
        let args = quoted_segments(line);
        let Some(condition) = args.first().cloned() else {
            return self.warn_or_err(format!("JIKA without quoted condition: {}", line));
        };

        let Some(body) = self.collect_block("JIKA MUNCUL TEKS", "AKHIR JIKA") else {
            return self.warn_or_err(format!(
                "JIKA MUNCUL TEKS \"{}\" is never closed with AKHIR JIKA",
                condition
            ));
        };

        // Nesting is not supported: the body is re-parsed at execution time
        // and a nested opener would need its own closer from this block.
        if body
            .iter()
            .any(|l| starts_with_keyword(l.trim(), "JIKA MUNCUL TEKS"))
        {
            return self.warn_or_err(format!(
                "nested JIKA blocks are not supported, dropping block for '{}'",
                condition
            ));
        }

        Some(Ok(Step::Conditional { condition, body }))
    }

    fn handle_loop(&mut self, line: &str) -> Option<Result<Step>> {
        let header = Regex::new(r#"(?i)^ULANGI\s+"([^"]*)"\s+DARI\s+\[(.*)\]\s*$"#).unwrap();
        let Some(caps) = header.captures(line) else {
            return self.warn_or_err(format!("Malformed ULANGI header: {}", line));
        };
        let var = caps[1].to_string();
        let items = parse_list_literal(&caps[2]);

        let Some(body) = self.collect_block("ULANGI", "SELESAI ULANGI") else {
            return self.warn_or_err(format!(
                "ULANGI \"{}\" is never closed with SELESAI ULANGI",
                var
            ));
        };

        // Unroll: literal replacement of the {var} token per item, in source
        // order, re-emitted through the parser via a fresh frame.
        let token = format!("{{{}}}", var);
        let mut unrolled = Vec::with_capacity(body.len() * items.len());
        for item in &items {
            for body_line in &body {
                unrolled.push(body_line.replace(&token, item));
            }
        }

        let base_dir = self
            .frames
            .last()
            .map(|f| f.base_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        self.frames.push(Frame {
            lines: unrolled,
            pos: 0,
            base_dir,
        });

        None
    }

    fn handle_include(&mut self, line: &str) -> Option<Result<Step>> {
        let args = quoted_segments(line);
        let Some(raw_path) = args.first() else {
            return self.warn_or_err(format!("Include without quoted path: {}", line));
        };

        let base_dir = self
            .frames
            .last()
            .map(|f| f.base_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let path = if Path::new(raw_path).is_absolute() {
            PathBuf::from(raw_path)
        } else {
            base_dir.join(raw_path)
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                return self.warn_or_err(format!(
                    "Cannot include {}: {}",
                    path.display(),
                    e
                ));
            }
        };

        let include_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        self.frames.push(Frame {
            lines: text.lines().map(String::from).collect(),
            pos: 0,
            base_dir: include_dir,
        });

        None
    }
}

impl Iterator for StepStream {
    type Item = Result<Step>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.frames.last_mut()?;
            let Some(raw) = frame.next_line() else {
                self.frames.pop();
                continue;
            };
            let line = raw.trim().to_string();

            if line.is_empty() {
                continue;
            }

            if let Some(name) = feature_marker(&line) {
                self.feature = name.clone();
                return Some(Ok(Step::Feature { name }));
            }

            if line.starts_with('#') {
                continue;
            }

            if starts_with_keyword(&line, "JIKA MUNCUL TEKS") {
                match self.handle_conditional(&line) {
                    Some(result) => return Some(result),
                    None => continue,
                }
            }

            if starts_with_keyword(&line, "ULANGI") {
                match self.handle_loop(&line) {
                    Some(result) => return Some(result),
                    None => continue,
                }
            }

            if starts_with_keyword(&line, "JALANKAN") || starts_with_keyword(&line, "INCLUDE") {
                match self.handle_include(&line) {
                    Some(result) => return Some(result),
                    None => continue,
                }
            }

            if starts_with_keyword(&line, "AKHIR JIKA")
                || starts_with_keyword(&line, "SELESAI ULANGI")
            {
                match self.warn_or_err(format!("Block closer without opener: {}", line)) {
                    Some(result) => return Some(result),
                    None => continue,
                }
            }

            match parse_command_line(&line) {
                Ok(step) => return Some(Ok(step)),
                Err(reason) => match self.warn_or_err(reason) {
                    Some(result) => return Some(result),
                    None => continue,
                },
            }
        }
    }
}

/// Case-insensitive keyword match at line start
fn starts_with_keyword(line: &str, keyword: &str) -> bool {
    line.is_char_boundary(keyword.len())
        && line.len() >= keyword.len()
        && line[..keyword.len()].eq_ignore_ascii_case(keyword)
}

/// Quoted segments of a line, in order
fn quoted_segments(line: &str) -> Vec<String> {
    line.split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s.to_string())
        .collect()
}

/// `# FITUR:` / `# FEATURE:` marker, returning the feature name
fn feature_marker(line: &str) -> Option<String> {
    let upper = line.to_uppercase();
    if !upper.starts_with("# FITUR:") && !upper.starts_with("# FEATURE:") {
        return None;
    }
    line.splitn(2, ':')
        .nth(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Elements of a `[a, "b", c]` list literal body (without brackets)
fn parse_list_literal(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in inner.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                items.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    items.push(current);

    items
        .into_iter()
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Tokenize a plain command line via the prefix table
fn parse_command_line(line: &str) -> std::result::Result<Step, String> {
    let args = quoted_segments(line);

    for (prefix, command, arg_count) in COMMAND_TABLE {
        if !starts_with_keyword(line, prefix) {
            continue;
        }
        if args.len() < arg_count {
            return Err(format!(
                "'{}' needs {} quoted argument(s), found {}: {}",
                prefix,
                arg_count,
                args.len(),
                line
            ));
        }
        return Ok(Step::Action {
            command,
            args: args[..arg_count].to_vec(),
            raw: line.to_string(),
        });
    }

    Err(format!("Unrecognized statement: {}", line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(lines: &[&str]) -> Vec<Step> {
        let parser = ScriptParser::new(ParseOptions::default());
        parser
            .parse_lines(
                lines.iter().map(|s| s.to_string()).collect(),
                PathBuf::from("."),
                DEFAULT_FEATURE,
            )
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_plain_commands() {
        let steps = parse_all(&[
            r#"Buka aplikasi "com.example.app""#,
            r#"Ketik "Budi" pada kolom "Nama""#,
            r#"Ketuk tombol "Simpan""#,
            r#"Tunggu sampai muncul teks "Beranda""#,
            r#"Pastikan muncul teks "Tersimpan""#,
            r#"HARUS muncul teks "Beranda""#,
            r#"Gulir ke "Bawah""#,
            r#"SIMPAN teks dari "total" KE "Total""#,
            r#"TEKAN TOMBOL SISTEM "back""#,
        ]);

        let commands: Vec<Command> = steps
            .iter()
            .map(|s| match s {
                Step::Action { command, .. } => *command,
                _ => panic!("expected action"),
            })
            .collect();

        assert_eq!(
            commands,
            vec![
                Command::OpenApp,
                Command::InputText,
                Command::Tap,
                Command::WaitFor,
                Command::AssertSoft,
                Command::AssertHard,
                Command::Scroll,
                Command::SaveText,
                Command::PressKey,
            ]
        );

        match &steps[1] {
            Step::Action { args, .. } => assert_eq!(args, &["Budi", "Nama"]),
            _ => unreachable!(),
        }
        match &steps[7] {
            Step::Action { args, .. } => assert_eq!(args, &["total", "Total"]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let steps = parse_all(&["", "# just a note", r#"Ketuk tombol "OK""#]);
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_feature_marker() {
        let parser = ScriptParser::new(ParseOptions::default());
        let mut stream = parser.parse_lines(
            vec![
                "# FITUR: Login".to_string(),
                r#"Ketuk tombol "Masuk""#.to_string(),
            ],
            PathBuf::from("."),
            DEFAULT_FEATURE,
        );

        assert_eq!(stream.feature(), DEFAULT_FEATURE);
        assert_eq!(
            stream.next().unwrap().unwrap(),
            Step::Feature {
                name: "Login".to_string()
            }
        );
        assert_eq!(stream.feature(), "Login");

        let steps = parse_all(&["# feature: Checkout"]);
        assert_eq!(
            steps[0],
            Step::Feature {
                name: "Checkout".to_string()
            }
        );
    }

    #[test]
    fn test_conditional_block_keeps_exact_body() {
        let steps = parse_all(&[
            r#"JIKA MUNCUL TEKS "Lewati""#,
            r#"Ketuk tombol "Lewati""#,
            r#"Tunggu sampai muncul teks "Beranda""#,
            "AKHIR JIKA",
            r#"Ketuk tombol "Lanjut""#,
        ]);

        assert_eq!(steps.len(), 2);
        match &steps[0] {
            Step::Conditional { condition, body } => {
                assert_eq!(condition, "Lewati");
                assert_eq!(
                    body,
                    &vec![
                        r#"Ketuk tombol "Lewati""#.to_string(),
                        r#"Tunggu sampai muncul teks "Beranda""#.to_string(),
                    ]
                );
            }
            other => panic!("expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_conditional_rejected() {
        let steps = parse_all(&[
            r#"JIKA MUNCUL TEKS "A""#,
            r#"JIKA MUNCUL TEKS "B""#,
            "AKHIR JIKA",
            "AKHIR JIKA",
            r#"Ketuk tombol "Lanjut""#,
        ]);
        // Whole outer block dropped in lenient mode, trailing tap survives
        assert_eq!(steps.len(), 1);
        assert!(matches!(&steps[0], Step::Action { .. }));
    }

    #[test]
    fn test_nested_conditional_strict_errors() {
        let parser = ScriptParser::new(ParseOptions { strict: true });
        let result: Result<Vec<Step>> = parser
            .parse_lines(
                vec![
                    r#"JIKA MUNCUL TEKS "A""#.to_string(),
                    r#"JIKA MUNCUL TEKS "B""#.to_string(),
                    "AKHIR JIKA".to_string(),
                    "AKHIR JIKA".to_string(),
                ],
                PathBuf::from("."),
                DEFAULT_FEATURE,
            )
            .collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_loop_unrolls_in_order() {
        let steps = parse_all(&[
            r#"ULANGI "menu" DARI ["Makanan", "Minuman"]"#,
            r#"Ketuk tombol "{menu}""#,
            "SELESAI ULANGI",
        ]);

        assert_eq!(steps.len(), 2);
        let selectors: Vec<&str> = steps
            .iter()
            .map(|s| match s {
                Step::Action { command, args, .. } => {
                    assert_eq!(*command, Command::Tap);
                    args[0].as_str()
                }
                other => panic!("expected action, got {:?}", other),
            })
            .collect();
        assert_eq!(selectors, vec!["Makanan", "Minuman"]);
    }

    #[test]
    fn test_loop_unrolling_is_idempotent() {
        // Re-parsing the already-unrolled lines yields the same steps
        let looped = parse_all(&[
            r#"ULANGI "x" DARI ["A","B"]"#,
            r#"Ketuk tombol "{x}""#,
            "SELESAI ULANGI",
        ]);
        let flat = parse_all(&[r#"Ketuk tombol "A""#, r#"Ketuk tombol "B""#]);
        assert_eq!(looped, flat);
    }

    #[test]
    fn test_loop_with_bare_list_items() {
        let steps = parse_all(&[
            r#"ULANGI "n" DARI [1, 2, 3]"#,
            r#"Ketik "{n}" pada kolom "urutan {n}""#,
            "SELESAI ULANGI",
        ]);
        assert_eq!(steps.len(), 3);
        match &steps[2] {
            Step::Action { args, .. } => assert_eq!(args, &["3", "urutan 3"]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_malformed_line_skipped_lenient() {
        let steps = parse_all(&[
            "Ketik tanpa argumen",
            r#"Ketuk tombol "OK""#,
            "AKHIR JIKA",
        ]);
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_malformed_line_strict_errors() {
        let parser = ScriptParser::new(ParseOptions { strict: true });
        let result: Result<Vec<Step>> = parser
            .parse_lines(
                vec!["Lakukan sesuatu aneh".to_string()],
                PathBuf::from("."),
                DEFAULT_FEATURE,
            )
            .collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_include_splices_inline() {
        let dir = std::env::temp_dir().join("sigap_parser_include_test");
        std::fs::create_dir_all(&dir).unwrap();
        let included = dir.join("login.sigap");
        std::fs::write(
            &included,
            "Ketuk tombol \"Masuk\"\nTunggu sampai muncul teks \"Beranda\"\n",
        )
        .unwrap();

        let parser = ScriptParser::new(ParseOptions::default());
        let steps: Vec<Step> = parser
            .parse_lines(
                vec![
                    r#"Buka aplikasi "com.example.app""#.to_string(),
                    r#"JALANKAN "login.sigap""#.to_string(),
                    r#"Ketuk tombol "Profil""#.to_string(),
                ],
                dir.clone(),
                DEFAULT_FEATURE,
            )
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(steps.len(), 4);
        match &steps[1] {
            Step::Action { command, args, .. } => {
                assert_eq!(*command, Command::Tap);
                assert_eq!(args[0], "Masuk");
            }
            _ => panic!("expected spliced tap"),
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_include_lenient_vs_strict() {
        let lines = vec![
            r#"JALANKAN "does_not_exist.sigap""#.to_string(),
            r#"Ketuk tombol "OK""#.to_string(),
        ];

        let lenient = ScriptParser::new(ParseOptions::default());
        let steps: Vec<Step> = lenient
            .parse_lines(lines.clone(), PathBuf::from("/nonexistent"), DEFAULT_FEATURE)
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(steps.len(), 1);

        let strict = ScriptParser::new(ParseOptions { strict: true });
        let result: Result<Vec<Step>> = strict
            .parse_lines(lines, PathBuf::from("/nonexistent"), DEFAULT_FEATURE)
            .collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_list_literal() {
        assert_eq!(
            parse_list_literal(r#""a", "b,c", d"#),
            vec!["a", "b,c", "d"]
        );
        assert_eq!(parse_list_literal(""), Vec::<String>::new());
    }
}
