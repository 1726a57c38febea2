//! Подготовка текста для синтеза речи

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref MARKUP: Regex = Regex::new(r"<[^>]*>").expect("valid markup regex");
    static ref CODE_FENCE: Regex = Regex::new(r"^```[a-zA-Z]*\s*|\s*```$").expect("valid fence regex");
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?。！？…]+[\s]*").expect("valid sentence regex");
}

/// Удаляет разметку и HTML-сущности, нормализует пробелы
pub fn prepare_text_for_tts(text: &str) -> String {
    let text = MARKUP.replace_all(text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Очищает ответ языковой модели: обрамление кодом и кавычки вокруг всего текста
pub fn clean_model_reply(reply: &str) -> String {
    let trimmed = CODE_FENCE.replace_all(reply.trim(), "");
    let trimmed = trimmed.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

/// Делит текст на части не длиннее `max_chars` символов по границам предложений.
/// Предложение длиннее лимита режется по пробелам, а слово длиннее лимита по символам.
pub fn split_for_synthesis(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END.find_iter(text) {
        sentences.push(&text[last..m.end()]);
        last = m.end();
    }
    if last < text.len() {
        sentences.push(&text[last..]);
    }

    for sentence in sentences {
        if current.chars().count() + sentence.chars().count() <= max_chars {
            current.push_str(sentence);
            continue;
        }
        if !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }
        current = String::new();

        if sentence.chars().count() <= max_chars {
            current.push_str(sentence);
            continue;
        }
        for word in sentence.split_whitespace() {
            if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
                chunks.push(current.trim().to_string());
                current = String::new();
            }
            if word.chars().count() > max_chars {
                let chars: Vec<char> = word.chars().collect();
                for piece in chars.chunks(max_chars) {
                    chunks.push(piece.iter().collect());
                }
                continue;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}
