//! Cleanup of raw generated text into a small markdown document

use std::collections::HashSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Chat/turn markers some models leak into their output
const CONTROL_TOKENS: &[&str] = &[
  "<|im_start|>"
, "<|im_end|>"
, "<s>"
, "</s>"
, "<|endoftext|>"
, "<|assistant|>"
, "<|user|>"
, "<|system|>"
];

const JSON_PREFIX: &str = "{\"generated_text\":";

/// Shortest repeated run that gets collapsed
const MIN_REPEAT_UNIT: usize = 30;
const MIN_REPEAT_COPIES: usize = 3;
/// Paragraphs shorter than this are noise
const MIN_PARAGRAPH_CHARS: usize = 15;
const TITLE_WORDS: usize = 5;
/// One pass can expose a pattern at a seam it created
const MAX_PASSES: usize = 4;

static FILLER: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)give me a|write a|tell me about|create a")
    .expect("filler regex")
});

static TOPIC: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)^(short story|story|essay|poem|article|text) (about|on|regarding) (.+?)[.?]?$"
  ).expect("topic regex")
});

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\n{3,}").expect("newline regex")
});

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\n{2,}").expect("paragraph regex")
});

static NON_WORD: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"[^\w\s]").expect("non-word regex")
});

/// Normalize raw model output against the prompt that produced it.
///
/// Pure and deterministic. The result is a fixed point:
/// `normalize(&normalize(x, p), p) == normalize(x, p)`.
pub fn normalize(raw: &str, prompt: &str) -> String
{   if raw.is_empty()
    {   return String::new();
    }
    let mut current = normalize_once(raw, prompt);
    for _ in 1..MAX_PASSES
    {   let next = normalize_once(&current, prompt);
        if next == current
        {   break;
        }
        current = next;
    }
    current
}

/// Like [`normalize`], for upstream JSON; non-strings give "".
pub fn normalize_value(raw: &Value, prompt: &str) -> String
{   match raw
    {   Value::String(text) => normalize(text, prompt)
      , _ => String::new()
    }
}

fn normalize_once(raw: &str, prompt: &str) -> String
{   if raw.is_empty()
    {   return String::new();
    }
    let cleaned = clean(raw);
    let trimmed = cleaned.trim();

    let (heading, body) = if trimmed.starts_with('#')
    {   match trimmed.split_once('\n')
        {   Some((first, rest)) => {
              (Some(first.trim_end().to_string()), rest)
            }
          , None => (Some(trimmed.to_string()), "")
        }
    } else
    {   (synthesize_heading(prompt), trimmed)
    };

    let paragraphs = unique_paragraphs(body);

    let mut result = heading.unwrap_or_default();
    if !paragraphs.is_empty()
    {   if !result.is_empty()
        {   result.push_str("\n\n");
        }
        result.push_str(&paragraphs.join("\n\n"));
    }
    match result.chars().last()
    {   Some('.') | Some('!') | Some('?') | None => {}
      , Some(_) => result.push('.')
    }
    result
}

/// Steps that only ever shorten the text, run until nothing changes.
/// Trimming is part of the step: a stripped quote can expose
/// whitespace hiding another one.
fn clean(text: &str) -> String
{   let mut current = text.to_string();
    loop
    {   let next = clean_once(&current).trim().to_string();
        if next == current
        {   return current;
        }
        current = next;
    }
}

fn clean_once(text: &str) -> String
{   let mut text = text.replace(JSON_PREFIX, "");
    if text.ends_with('}')
    {   text.pop();
    }
    if text.starts_with('"')
    {   text.remove(0);
    }
    if text.ends_with('"')
    {   text.pop();
    }

    for token in CONTROL_TOKENS
    {   text = text.replace(token, "");
    }

    let text = collapse_repeats(&text)
      .replace("\\\"", "\"")
      .replace("\\'", "'")
      .replace("\\n", "\n")
      .replace("\\t", "\t");

    EXCESS_NEWLINES.replace_all(&text, "\n\n").into_owned()
}

/// Replace a run of 3+ back-to-back copies of a 30+ char unit
/// with one copy. Units never cross a line break.
fn collapse_repeats(text: &str) -> String
{   let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len()
    {   match repeat_at(&chars, i)
        {   Some((unit, copies)) => {
              out.extend(&chars[i..i + unit]);
              i += unit * copies;
            }
          , None => {
              out.push(chars[i]);
              i += 1;
            }
        }
    }
    out
}

/// Longest unit first, then as many copies as follow
fn repeat_at(chars: &[char], start: usize) -> Option<(usize, usize)>
{   let line_end = chars[start..]
      .iter()
      .position(|c| *c == '\n' || *c == '\r')
      .map_or(chars.len(), |p| start + p);
    let mut unit = (line_end - start) / MIN_REPEAT_COPIES;

    while unit >= MIN_REPEAT_UNIT
    {   let first = &chars[start..start + unit];
        let mut copies = 1;
        while start + (copies + 1) * unit <= line_end
          && &chars[start + copies * unit..start + (copies + 1) * unit]
            == first
        {   copies += 1;
        }
        if copies >= MIN_REPEAT_COPIES
        {   return Some((unit, copies));
        }
        unit -= 1;
    }
    None
}

/// "# Topic" from the prompt, or None when nothing is left of it
fn synthesize_heading(prompt: &str) -> Option<String>
{   let stripped = FILLER.replace_all(prompt, "");
    let clean_prompt = single_line(&stripped);
    if clean_prompt.is_empty()
    {   return None;
    }

    if let Some(caps) = TOPIC.captures(&clean_prompt)
    {   let topic = caps[3].trim();
        if !topic.is_empty()
        {   return Some(format!("# {}", capitalize(topic)));
        }
    }

    let words: Vec<&str> = clean_prompt.split(' ').collect();
    let mut title = words
      .iter()
      .take(TITLE_WORDS)
      .copied()
      .collect::<Vec<_>>()
      .join(" ");
    if words.len() > TITLE_WORDS
    {   title.push_str("...");
    }
    Some(format!("# {}", title))
}

/// Cleaned like the body and squeezed onto one line
fn single_line(text: &str) -> String
{   let mut current = squeeze(text);
    loop
    {   let next = squeeze(&clean(&current));
        if next == current
        {   return current;
        }
        current = next;
    }
}

fn squeeze(text: &str) -> String
{   text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capitalize(text: &str) -> String
{   let mut chars = text.chars();
    match chars.next()
    {   Some(first) => first.to_uppercase().chain(chars).collect()
      , None => String::new()
    }
}

fn unique_paragraphs(body: &str) -> Vec<&str>
{   let mut seen = HashSet::new();
    PARAGRAPH_BREAK
      .split(body)
      .map(str::trim)
      .filter(|p| p.chars().count() >= MIN_PARAGRAPH_CHARS)
      .filter(|p| seen.insert(fingerprint(p)))
      .collect()
}

/// Case and punctuation blind identity of a paragraph
fn fingerprint(paragraph: &str) -> String
{   NON_WORD.replace_all(&paragraph.to_lowercase(), "").into_owned()
}
