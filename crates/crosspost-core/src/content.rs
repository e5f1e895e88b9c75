//! Rendering of post content under a platform character budget.
//!
//! Length is measured the way the platforms count it: a link always costs
//! at most 23 characters plus the two newlines separating it from the text,
//! and each emoji costs two characters more than its code-point length.
//! When content is over budget the tags are dropped first; only then is the
//! title truncated.

use unicode_segmentation::UnicodeSegmentation;

use crate::{account::Host, post::Post};

/// Characters a link is billed for, including its two leading newlines.
pub const LINK_RESERVED: usize = 23 + 2;

/// Extra characters billed for each emoji.
pub const EMOJI_EXTRA: usize = 2;

// ─── Pieces ──────────────────────────────────────────────────────────────────

/// Strip everything that is not an ASCII letter or digit.
pub fn sanitise_tag(tag: &str) -> String {
  tag.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// `" #a #b"`, or an empty string when no tag survives sanitising.
pub fn render_tags(tags: &[String]) -> String {
  let tags: Vec<String> = tags
    .iter()
    .map(|t| sanitise_tag(t))
    .filter(|t| !t.is_empty())
    .map(|t| format!("#{t}"))
    .collect();
  if tags.is_empty() {
    String::new()
  } else {
    format!(" {}", tags.join(" "))
  }
}

/// `"\n\n<url>"`, or an empty string without a link.
pub fn render_link(link: Option<&str>) -> String {
  match link.map(str::trim) {
    Some(url) if !url.is_empty() => format!("\n\n{url}"),
    _ => String::new(),
  }
}

fn is_emoji(grapheme: &str) -> bool {
  if emojis::get(grapheme).is_some() {
    return true;
  }
  // Skin-tone and other modified sequences: judge by the base character.
  let mut buf = [0u8; 4];
  grapheme
    .chars()
    .next()
    .is_some_and(|c| !c.is_ascii() && emojis::get(c.encode_utf8(&mut buf)).is_some())
}

/// Number of emoji graphemes in `text`.
pub fn count_emoji(text: &str) -> usize {
  text.graphemes(true).filter(|g| is_emoji(g)).count()
}

fn link_cost(link: &str) -> usize { link.chars().count().min(LINK_RESERVED) }

/// Billed length of already-rendered pieces.
pub fn billed_len(title: &str, tags: &str, link: &str) -> usize {
  let emoji = count_emoji(title) + count_emoji(tags) + count_emoji(link);
  title.chars().count()
    + tags.chars().count()
    + link_cost(link)
    + emoji * EMOJI_EXTRA
}

/// Keep whole graphemes of `text` while the code-point count stays within
/// `max_chars`.
fn truncate_graphemes(text: &str, max_chars: usize) -> &str {
  let mut used = 0;
  let mut end = 0;
  for (offset, grapheme) in text.grapheme_indices(true) {
    let chars = grapheme.chars().count();
    if used + chars > max_chars {
      break;
    }
    used += chars;
    end = offset + grapheme.len();
  }
  &text[..end]
}

// ─── Rendering ───────────────────────────────────────────────────────────────

/// Render `title`, `tags` and `link` within `limit` billed characters.
pub fn prepare_with_limit(
  limit: usize,
  title: &str,
  tags: &[String],
  link: Option<&str>,
) -> String {
  let mut tags = render_tags(tags);
  let link = render_link(link);
  let mut title = title;

  if billed_len(title, &tags, &link) > limit {
    tags.clear();
  }
  if billed_len(title, &tags, &link) > limit {
    let link_reserved = if link.is_empty() { 0 } else { LINK_RESERVED };
    let emoji_overhead = (count_emoji(title) + count_emoji(&link)) * EMOJI_EXTRA;
    let budget = limit
      .saturating_sub(link_reserved)
      .saturating_sub(emoji_overhead);
    title = truncate_graphemes(title, budget);
  }

  format!("{title}{tags}{link}")
}

/// Render content for `host` using its character budget.
pub fn prepare_post(
  host: Host,
  title: &str,
  tags: &[String],
  link: Option<&str>,
) -> String {
  prepare_with_limit(host.char_limit(), title, tags, link)
}

/// Render a stored post for `host`.
pub fn render(host: Host, post: &Post) -> String {
  prepare_post(host, &post.title, &post.tags, post.link.as_deref())
}

/// The `@receiver ` prefix, if a receiver is set.
fn mention(receiver: Option<&str>) -> Option<String> {
  match receiver.map(str::trim) {
    Some(r) if !r.is_empty() => Some(format!("@{} ", r.trim_start_matches('@'))),
    _ => None,
  }
}

/// Prefix `content` with `@receiver` when a receiver is set.
pub fn address(content: &str, receiver: Option<&str>) -> String {
  match mention(receiver) {
    Some(prefix) => format!("{prefix}{content}"),
    None => content.to_owned(),
  }
}

/// Render a stored post for `host` addressed to `receiver`. The prefix is
/// billed against the host budget.
pub fn render_addressed(host: Host, post: &Post, receiver: Option<&str>) -> String {
  let prefix_len = mention(receiver).map_or(0, |prefix| billed_len(&prefix, "", ""));
  let limit = host.char_limit().saturating_sub(prefix_len);
  let body = prepare_with_limit(limit, &post.title, &post.tags, post.link.as_deref());
  address(&body, receiver)
}
