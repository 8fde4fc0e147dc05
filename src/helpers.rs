pub trait NormalizeGuess {
    fn normalize_guess(&self) -> String;
}

impl NormalizeGuess for str {
    fn normalize_guess(&self) -> String {
        self.trim().to_uppercase()
    }
}

impl NormalizeGuess for String {
    fn normalize_guess(&self) -> String {
        self.as_str().normalize_guess()
    }
}
