use std::collections::HashMap;
use std::path::Path;

use super::model::KokoroError;

const CONFIG_FILE: &str = "config.json";

/// Punctuation preferred as window boundaries when a segment is split.
pub const BOUNDARY_MARKS: [char; 6] = [';', ':', ',', '.', '!', '?'];

/// Kokoro v1.0 vocabulary, used when a model directory ships without
/// `config.json` (the kokoro-onnx release files don't include one).
const FALLBACK_VOCAB: &[(char, i64)] = &[
    (';', 1), (':', 2), (',', 3), ('.', 4), ('!', 5), ('?', 6), ('—', 9), ('…', 10), ('"', 11),
    ('(', 12), (')', 13), ('\u{201c}', 14), ('\u{201d}', 15), (' ', 16), ('\u{0303}', 17),
    ('ʣ', 18), ('ʥ', 19), ('ʦ', 20), ('ʨ', 21), ('ᵝ', 22), ('ꭧ', 23), ('A', 24), ('I', 25),
    ('O', 31), ('Q', 33), ('S', 35), ('T', 36), ('W', 39), ('Y', 41), ('ᵊ', 42), ('a', 43),
    ('b', 44), ('c', 45), ('d', 46), ('e', 47), ('f', 48), ('h', 50), ('i', 51), ('j', 52),
    ('k', 53), ('l', 54), ('m', 55), ('n', 56), ('o', 57), ('p', 58), ('q', 59), ('r', 60),
    ('s', 61), ('t', 62), ('u', 63), ('v', 64), ('w', 65), ('x', 66), ('y', 67), ('z', 68),
    ('ɑ', 69), ('ɐ', 70), ('ɒ', 71), ('æ', 72), ('β', 75), ('ɔ', 76), ('ɕ', 77), ('ç', 78),
    ('ɖ', 80), ('ð', 81), ('ʤ', 82), ('ə', 83), ('ɚ', 85), ('ɛ', 86), ('ɜ', 87), ('ɟ', 90),
    ('ɡ', 92), ('ɥ', 99), ('ɨ', 101), ('ɪ', 102), ('ʝ', 103), ('ɯ', 110), ('ɰ', 111),
    ('ŋ', 112), ('ɳ', 113), ('ɲ', 114), ('ɴ', 115), ('ø', 116), ('ɸ', 118), ('θ', 119),
    ('œ', 120), ('ɹ', 123), ('ɾ', 125), ('ɻ', 126), ('ʁ', 128), ('ɽ', 129), ('ʂ', 130),
    ('ʃ', 131), ('ʈ', 132), ('ʧ', 133), ('ʊ', 135), ('ʋ', 136), ('ʌ', 138), ('ɣ', 139),
    ('ɤ', 140), ('χ', 142), ('ʎ', 143), ('ʒ', 147), ('ʔ', 148), ('ˈ', 156), ('ˌ', 157),
    ('ː', 158), ('ʰ', 162), ('ʲ', 164), ('↓', 169), ('→', 171), ('↗', 172), ('↘', 173),
    ('ᵻ', 177),
];

/// Vocabulary for a model directory: `config.json` when present, otherwise
/// the built-in table.
pub fn vocab_for_dir(model_dir: &Path) -> Result<HashMap<char, i64>, KokoroError> {
    let config_path = model_dir.join(CONFIG_FILE);
    if config_path.exists() {
        log::info!("Loading vocab from {}", config_path.display());
        load_vocab(&config_path)
    } else {
        log::warn!("config.json not found in {}, using built-in vocab", model_dir.display());
        Ok(fallback_vocab())
    }
}

pub fn fallback_vocab() -> HashMap<char, i64> {
    FALLBACK_VOCAB.iter().copied().collect()
}

/// Read the `"vocab"` map (single-character keys to token IDs) from config.json.
pub fn load_vocab(config_path: &Path) -> Result<HashMap<char, i64>, KokoroError> {
    let content = std::fs::read_to_string(config_path)?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| KokoroError::Config(format!("Failed to parse JSON: {e}")))?;

    let entries = json
        .get("vocab")
        .and_then(|v| v.as_object())
        .ok_or_else(|| KokoroError::Config("missing 'vocab' object".to_string()))?;

    entries
        .iter()
        .map(|(key, value)| {
            let ch = key
                .chars()
                .next()
                .ok_or_else(|| KokoroError::Config(format!("empty vocab key {key:?}")))?;
            let id = value
                .as_i64()
                .ok_or_else(|| KokoroError::Config(format!("non-integer id for {key:?}")))?;
            Ok((ch, id))
        })
        .collect()
}
