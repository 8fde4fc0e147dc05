/// Key presses forwarded by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Backspace,
    Enter,
}

impl KeyInput {
    /// Letters (any script), digits, spaces and the punctuation found in
    /// stage names.
    pub fn is_typeable(c: char) -> bool {
        c.is_alphanumeric() || matches!(c, ' ' | '-' | '.' | '\'' | '&')
    }
}
