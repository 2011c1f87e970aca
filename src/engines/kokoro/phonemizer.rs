use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::model::KokoroError;

/// Where to find espeak-ng. `None` fields fall back to the system install.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

/// Map a voice name prefix (`af_heart` → `af`) to an espeak-ng language code.
pub fn voice_lang(voice: &str) -> &'static str {
    match voice.get(..2).unwrap_or_default() {
        "bf" | "bm" => "en-gb",
        "ef" | "em" => "es",
        "ff" => "fr",
        "hf" | "hm" => "hi",
        "if" | "im" => "it",
        "jf" | "jm" => "ja",
        "pf" | "pm" => "pt-br",
        "zf" | "zm" => "cmn",
        _ => "en-us",
    }
}

/// Text split at punctuation. espeak-ng drops punctuation, but Kokoro uses
/// it for prosody, so marks are kept aside and re-inserted as tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Words(String),
    Mark(char),
}

/// Convert text to Kokoro token IDs. IPA characters missing from `vocab`
/// are dropped.
pub fn phonemize(
    text: &str,
    lang: &str,
    vocab: &HashMap<char, i64>,
    espeak: &EspeakConfig,
) -> Result<Vec<i64>, KokoroError> {
    let pieces = split_pieces(text);
    let phrases: Vec<&str> = pieces
        .iter()
        .filter_map(|piece| match piece {
            Piece::Words(words) => Some(words.as_str()),
            Piece::Mark(_) => None,
        })
        .collect();
    if pieces.is_empty() {
        return Ok(Vec::new());
    }

    let mut phrase_ids = ipa_for_phrases(&phrases, lang, espeak)?
        .into_iter()
        .map(|ipa| ipa_to_ids(&ipa, vocab));

    let mut ids = Vec::new();
    for piece in &pieces {
        match piece {
            Piece::Words(_) => ids.extend(phrase_ids.next().unwrap_or_default()),
            Piece::Mark(mark) => ids.extend(vocab.get(mark).copied()),
        }
    }
    Ok(ids)
}

fn split_pieces(text: &str) -> Vec<Piece> {
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut words = String::new();

    let flush = |words: &mut String, pieces: &mut Vec<Piece>| {
        let trimmed = words.trim();
        if !trimmed.is_empty() {
            pieces.push(Piece::Words(trimmed.to_string()));
        }
        words.clear();
    };

    for (i, &ch) in chars.iter().enumerate() {
        // "2.0" and "1,000" stay inside the words.
        let between_digits = matches!(ch, '.' | ',')
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());

        match prosody_mark(ch) {
            Some(mark) if !between_digits => {
                flush(&mut words, &mut pieces);
                pieces.push(Piece::Mark(mark));
            }
            _ if ch.is_whitespace() => {
                if !words.is_empty() && !words.ends_with(' ') {
                    words.push(' ');
                }
            }
            _ => words.push(ch),
        }
    }
    flush(&mut words, &mut pieces);
    pieces
}

fn prosody_mark(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

/// One espeak-ng call for all phrases (one per line). If the line count
/// doesn't match, retry phrase by phrase.
fn ipa_for_phrases(
    phrases: &[&str],
    lang: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<String>, KokoroError> {
    if phrases.is_empty() {
        return Ok(Vec::new());
    }

    let batched = run_espeak(&phrases.join("\n"), lang, espeak)?;
    let lines: Vec<String> = batched.lines().map(str::to_string).collect();
    if lines.len() == phrases.len() {
        return Ok(lines);
    }

    log::debug!(
        "espeak-ng returned {} lines for {} phrases, phonemizing one by one",
        lines.len(),
        phrases.len()
    );
    phrases
        .iter()
        .map(|phrase| run_espeak(phrase, lang, espeak))
        .collect()
}

fn run_espeak(input: &str, lang: &str, espeak: &EspeakConfig) -> Result<String, KokoroError> {
    let bin = espeak
        .bin_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("espeak-ng"));
    let mut command = Command::new(bin);
    command.args(["--ipa", "--stdin", "-q", "-v", lang]);
    if let Some(data) = &espeak.data_path {
        command.arg(format!("--path={}", data.display()));
    }

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => KokoroError::EspeakNotFound,
            _ => KokoroError::Io(e),
        })?;

    // Feed stdin from its own thread while stdout drains, so a large batch
    // cannot fill both pipes and stall.
    let stdin = child.stdin.take();
    let output = std::thread::scope(|scope| {
        let writer = scope.spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                // Without a trailing newline espeak-ng under-processes the last word.
                stdin.write_all(input.as_bytes())?;
                if !input.ends_with('\n') {
                    stdin.write_all(b"\n")?;
                }
            }
            Ok(())
        });
        let output = child.wait_with_output()?;
        writer
            .join()
            .map_err(|_| KokoroError::PhonemizerFailed("stdin writer panicked".to_string()))??;
        Ok::<_, KokoroError>(output)
    })?;
    if !output.status.success() {
        return Err(KokoroError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn ipa_to_ids(ipa: &str, vocab: &HashMap<char, i64>) -> Vec<i64> {
    ipa.lines()
        .flat_map(|line| line.trim().chars())
        .filter(|ch| *ch != '_')
        .filter_map(|ch| vocab.get(&ch).copied())
        .collect()
}
