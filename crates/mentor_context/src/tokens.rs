/// Rough token count for text: four tokens per three words, per line, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.lines().map(estimate_line).sum()
}

pub(crate) fn estimate_line(line: &str) -> usize {
    let words = line.split_whitespace().count();
    (words * 4).div_ceil(3)
}
