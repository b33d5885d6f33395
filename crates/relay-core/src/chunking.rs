//! Length-bounded message splitting.
//!
//! Lengths are counted in characters (Unicode scalar values), which is what the
//! Telegram message limit is measured in for the text we send.

/// Split `text` into chunks of at most `max_len` characters.
///
/// Break preference: paragraph (`\n\n`), line, word, then a hard cut. A finer
/// level is used only for a unit that does not fit on its own.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    split_with(text, max_len, false)
}

/// [`split_message`] for Telegram Markdown bodies.
///
/// Cuts never separate an escape pair, and boundaries inside an emphasis run,
/// a code span or a fence are skipped while a boundary outside one exists.
pub fn split_markdown(text: &str, max_len: usize) -> Vec<String> {
    split_with(text, max_len, true)
}

fn split_with(text: &str, max_len: usize, markdown: bool) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let max_len = max_len.max(1);
    if char_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let mut packer = Packer {
        max_len,
        markdown,
        out: Vec::new(),
        current: String::new(),
    };
    packer.pack(text, Level::Paragraph);
    packer.flush();
    packer.out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Level {
    Paragraph,
    Line,
    Word,
}

impl Level {
    fn separator(self) -> &'static str {
        match self {
            Level::Paragraph => "\n\n",
            Level::Line => "\n",
            Level::Word => " ",
        }
    }

    fn finer(self) -> Option<Level> {
        match self {
            Level::Paragraph => Some(Level::Line),
            Level::Line => Some(Level::Word),
            Level::Word => None,
        }
    }

    fn units(self, text: &str, markdown: bool) -> Vec<&str> {
        if markdown {
            let cuts = MarkdownCuts::scan(text);
            return match self {
                Level::Paragraph => split_where(text, "\n\n", &cuts.between_runs),
                Level::Line => split_where(text, "\n", &cuts.between_runs),
                Level::Word => words_where(text, &cuts.between_runs),
            };
        }
        match self {
            Level::Paragraph => text.split("\n\n").collect(),
            Level::Line => text.split('\n').collect(),
            Level::Word => text.split_whitespace().collect(),
        }
    }
}

struct Packer {
    max_len: usize,
    markdown: bool,
    out: Vec<String>,
    current: String,
}

impl Packer {
    fn pack(&mut self, text: &str, level: Level) {
        let sep = level.separator();

        for unit in level.units(text, self.markdown) {
            let unit = unit.trim();
            if unit.is_empty() {
                continue;
            }

            let unit_len = char_len(unit);
            if unit_len > self.max_len {
                self.flush();
                match level.finer() {
                    Some(finer) => self.pack(unit, finer),
                    None if self.markdown => self.hard_cut_markdown(unit),
                    None => self.hard_cut(unit),
                }
                continue;
            }

            if self.current.is_empty() {
                self.current.push_str(unit);
                continue;
            }

            if char_len(&self.current) + sep.len() + unit_len > self.max_len {
                self.flush();
                self.current.push_str(unit);
            } else {
                self.current.push_str(sep);
                self.current.push_str(unit);
            }
        }
    }

    /// Full pieces become chunks; the remainder keeps accumulating.
    fn hard_cut(&mut self, word: &str) {
        let chars: Vec<char> = word.chars().collect();
        let mut pieces = chars.chunks(self.max_len).peekable();
        while let Some(piece) = pieces.next() {
            let piece: String = piece.iter().collect();
            if pieces.peek().is_some() || piece.chars().count() == self.max_len {
                self.out.push(piece);
            } else {
                self.current = piece;
            }
        }
    }

    /// Like [`Packer::hard_cut`], but each cut backs off to the nearest offset
    /// [`MarkdownCuts`] allows.
    fn hard_cut_markdown(&mut self, word: &str) {
        let cuts = MarkdownCuts::scan(word);
        let mut start = 0;
        while let Some((rel, _)) = word[start..].char_indices().nth(self.max_len) {
            let cut = cuts.last_before(start, start + rel);
            self.out.push(word[start..cut].to_string());
            start = cut;
        }
        self.current = word[start..].to_string();
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.out.push(std::mem::take(&mut self.current));
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

// ============== Markdown cut points ==============

/// Byte offsets at which a Telegram Markdown text may be cut.
struct MarkdownCuts {
    /// Char boundaries that split neither an escape pair nor a fence marker.
    clean: Vec<bool>,
    /// Clean offsets outside every emphasis run, code span and fence.
    between_runs: Vec<bool>,
}

impl MarkdownCuts {
    fn scan(text: &str) -> Self {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut clean = vec![false; text.len() + 1];
        let mut between_runs = vec![false; text.len() + 1];
        let mut fence = false;
        let mut code = false;
        let mut emphasis: Option<char> = None;

        let mut i = 0;
        while let Some(&(at, ch)) = chars.get(i) {
            clean[at] = true;
            between_runs[at] = !fence && !code && emphasis.is_none();
            if text[at..].starts_with("```") {
                fence = !fence;
                i += 3;
                continue;
            }
            i += 1;
            match ch {
                '\\' => i += 1,
                _ if fence => {}
                '`' => code = !code,
                '*' | '_' if !code => {
                    if emphasis == Some(ch) {
                        emphasis = None;
                    } else if emphasis.is_none() && has_closer(&chars[i..], ch) {
                        emphasis = Some(ch);
                    }
                }
                _ => {}
            }
        }

        clean[text.len()] = true;
        between_runs[text.len()] = true;
        Self {
            clean,
            between_runs,
        }
    }

    /// Best cut in `start + 1..=limit`; `limit` itself when nothing is allowed.
    fn last_before(&self, start: usize, limit: usize) -> usize {
        let last = |allowed: &[bool]| (start + 1..=limit).rev().find(|&at| allowed[at]);
        last(self.between_runs.as_slice())
            .or_else(|| last(self.clean.as_slice()))
            .unwrap_or(limit)
    }
}

/// Whether an unescaped `delim` occurs in `rest`.
fn has_closer(rest: &[(usize, char)], delim: char) -> bool {
    let mut it = rest.iter();
    while let Some(&(_, ch)) = it.next() {
        if ch == '\\' {
            it.next();
        } else if ch == delim {
            return true;
        }
    }
    false
}

fn split_where<'a>(text: &'a str, sep: &str, allowed: &[bool]) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (at, _) in text.match_indices(sep) {
        if at >= start && allowed[at] {
            out.push(&text[start..at]);
            start = at + sep.len();
        }
    }
    out.push(&text[start..]);
    out
}

fn words_where<'a>(text: &'a str, allowed: &[bool]) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (at, ch) in text.char_indices() {
        if ch.is_whitespace() && allowed[at] {
            if at > start {
                out.push(&text[start..at]);
            }
            start = at + ch.len_utf8();
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

// ============== HTML tags ==============

#[derive(Clone, Debug)]
struct HtmlTag {
    name: String,
    open: String,
    close: String,
}

#[derive(Clone, Debug)]
enum HtmlToken<'a> {
    Tag(&'a str),
    Text(&'a str),
}

#[derive(Clone, Debug)]
enum TagAction {
    Open(HtmlTag),
    Close(String),
    Noop,
}

/// Make every HTML chunk self-contained.
///
/// Tags still open at the end of a chunk are closed there and reopened (with
/// their original attributes) at the start of the next one.
pub fn balance_html_chunks(chunks: Vec<String>) -> Vec<String> {
    let mut stack: Vec<HtmlTag> = Vec::new();
    let mut out = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let mut balanced = String::with_capacity(chunk.len());
        for t in &stack {
            balanced.push_str(&t.open);
        }

        for token in tokenize_html(&chunk) {
            match token {
                HtmlToken::Tag(tag) => {
                    apply_tag_action(&mut stack, parse_tag_action(tag));
                    balanced.push_str(tag);
                }
                HtmlToken::Text(text) => balanced.push_str(text),
            }
        }

        for t in stack.iter().rev() {
            balanced.push_str(&t.close);
        }
        out.push(balanced);
    }

    out
}

fn tokenize_html(mut s: &str) -> Vec<HtmlToken<'_>> {
    let mut out: Vec<HtmlToken<'_>> = Vec::new();
    while !s.is_empty() {
        let Some(start) = s.find('<') else {
            out.push(HtmlToken::Text(s));
            break;
        };
        if start > 0 {
            out.push(HtmlToken::Text(&s[..start]));
            s = &s[start..];
        }

        // Now s starts with '<'. Find matching '>' (best-effort).
        let Some(end) = s.find('>') else {
            out.push(HtmlToken::Text(s));
            break;
        };
        out.push(HtmlToken::Tag(&s[..=end]));
        s = &s[end + 1..];
    }
    out
}

fn parse_tag_action(tag: &str) -> TagAction {
    let t = tag.trim();
    if let Some(rest) = t.strip_prefix("</") {
        let name = parse_tag_name(rest);
        return if name.is_empty() {
            TagAction::Noop
        } else {
            TagAction::Close(name)
        };
    }

    if t.ends_with("/>") {
        return TagAction::Noop;
    }

    let name = parse_tag_name(&t[1..]);
    if name.is_empty() {
        return TagAction::Noop;
    }

    let close = format!("</{name}>");
    TagAction::Open(HtmlTag {
        name,
        open: t.to_string(),
        close,
    })
}

fn parse_tag_name(after_lt: &str) -> String {
    after_lt
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

fn apply_tag_action(stack: &mut Vec<HtmlTag>, action: TagAction) {
    match action {
        TagAction::Open(t) => stack.push(t),
        // Stray closers (no matching open tag) leave the stack alone.
        TagAction::Close(name) => {
            if let Some(pos) = stack.iter().rposition(|t| t.name == name) {
                stack.truncate(pos);
            }
        }
        TagAction::Noop => {}
    }
}

// ============== HTML splitting ==============

/// Split Telegram HTML into chunks of at most `max_len` characters that each
/// parse on their own.
///
/// Tags and character entities are never cut. Tags open at a break are closed
/// at the end of the chunk and reopened at the start of the next one, and the
/// room their closers need is reserved while the chunk fills. Breaks prefer the
/// coarsest boundary seen in the chunk, as [`split_message`] does.
pub fn split_html(html: &str, max_len: usize) -> Vec<String> {
    if html.is_empty() {
        return Vec::new();
    }
    let max_len = max_len.max(1);
    if char_len(html) <= max_len {
        return vec![html.to_string()];
    }

    let mut packer = HtmlPacker {
        max_len,
        out: Vec::new(),
        chunk: String::new(),
        chars: 0,
        prefix: 0,
        stack: Vec::new(),
        breaks: Default::default(),
    };
    packer.feed(html);
    packer.flush();
    packer.out
}

#[derive(Clone, Copy, Debug)]
enum HtmlAtom<'a> {
    Tag(&'a str),
    /// One character, or one `&...;` entity.
    Text(&'a str),
}

fn html_atoms(html: &str) -> Vec<HtmlAtom<'_>> {
    let mut atoms = Vec::new();
    for token in tokenize_html(html) {
        match token {
            HtmlToken::Tag(tag) => atoms.push(HtmlAtom::Tag(tag)),
            HtmlToken::Text(mut rest) => {
                while let Some(ch) = rest.chars().next() {
                    let len = match ch {
                        '&' => entity_len(rest).unwrap_or(1),
                        _ => ch.len_utf8(),
                    };
                    atoms.push(HtmlAtom::Text(&rest[..len]));
                    rest = &rest[len..];
                }
            }
        }
    }
    atoms
}

/// Byte length of the entity `s` starts with.
fn entity_len(s: &str) -> Option<usize> {
    let body = s.strip_prefix('&')?;
    let end = body.bytes().take(11).position(|b| b == b';')?;
    let name = &body[..end];
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '#');
    valid.then_some(end + 2)
}

fn close_len(stack: &[HtmlTag]) -> usize {
    stack.iter().map(|t| char_len(&t.close)).sum()
}

/// Closer length the chunk needs once `action` is applied.
fn close_len_after(stack: &[HtmlTag], action: &TagAction) -> usize {
    match action {
        TagAction::Open(tag) => close_len(stack) + char_len(&tag.close),
        TagAction::Close(name) => match stack.iter().rposition(|t| &t.name == name) {
            Some(pos) => close_len(&stack[..pos]),
            None => close_len(stack),
        },
        TagAction::Noop => close_len(stack),
    }
}

struct BreakPoint {
    at: usize,
    stack: Vec<HtmlTag>,
}

struct HtmlPacker {
    max_len: usize,
    out: Vec<String>,
    chunk: String,
    chars: usize,
    /// Byte length of the reopened tags the chunk starts with.
    prefix: usize,
    stack: Vec<HtmlTag>,
    /// Latest boundary per [`Level`] in the current chunk.
    breaks: [Option<BreakPoint>; 3],
}

impl HtmlPacker {
    fn feed(&mut self, html: &str) {
        for atom in html_atoms(html) {
            self.push(atom);
        }
    }

    fn push(&mut self, atom: HtmlAtom<'_>) {
        let (raw, action) = match atom {
            HtmlAtom::Tag(tag) => (tag, parse_tag_action(tag)),
            HtmlAtom::Text(text) => (text, TagAction::Noop),
        };
        let len = char_len(raw);

        while self.chars + len + close_len_after(&self.stack, &action) > self.max_len {
            if let Some(point) = self.take_break() {
                self.break_at(point);
            } else if self.chunk.len() > self.prefix {
                self.flush();
            } else if matches!(atom, HtmlAtom::Tag(_)) {
                // Not even a fresh chunk has room for it.
                return;
            } else {
                break;
            }
        }

        if let HtmlAtom::Text(text) = atom {
            self.note_break(text);
        }
        self.chunk.push_str(raw);
        self.chars += len;
        apply_tag_action(&mut self.stack, action);
    }

    fn note_break(&mut self, text: &str) {
        if !has_text(&self.chunk[self.prefix..]) {
            return;
        }
        let (level, at) = match text {
            "\n" if self.chunk.ends_with('\n') => (Level::Paragraph, self.chunk.len() - 1),
            "\n" => (Level::Line, self.chunk.len()),
            " " | "\t" => (Level::Word, self.chunk.len()),
            _ => return,
        };
        self.breaks[level as usize] = Some(BreakPoint {
            at,
            stack: self.stack.clone(),
        });
    }

    fn take_break(&mut self) -> Option<BreakPoint> {
        let point = self.breaks.iter_mut().find_map(Option::take);
        self.breaks = Default::default();
        point
    }

    /// Emit the chunk up to `point` and carry the rest into a new one.
    fn break_at(&mut self, point: BreakPoint) {
        let rest = self.chunk.split_off(point.at);
        if let Some(msg) = self.closed(&point.stack) {
            self.out.push(msg);
        }
        self.stack = point.stack;
        self.reopen();
        self.feed(rest.trim_start());
    }

    fn flush(&mut self) {
        if let Some(msg) = self.closed(&self.stack) {
            self.out.push(msg);
        }
        self.reopen();
    }

    /// The chunk with `stack` closed, unless it carries no text.
    fn closed(&self, stack: &[HtmlTag]) -> Option<String> {
        let body = self.chunk.trim_end();
        if !has_text(body.get(self.prefix..).unwrap_or_default()) {
            return None;
        }
        let mut msg = body.to_string();
        for tag in stack.iter().rev() {
            msg.push_str(&tag.close);
        }
        Some(msg)
    }

    fn reopen(&mut self) {
        self.chunk.clear();
        for tag in &self.stack {
            self.chunk.push_str(&tag.open);
        }
        self.prefix = self.chunk.len();
        self.chars = char_len(&self.chunk);
        self.breaks = Default::default();
    }
}

fn has_text(html: &str) -> bool {
    tokenize_html(html)
        .iter()
        .any(|t| matches!(t, HtmlToken::Text(s) if !s.trim().is_empty()))
}
