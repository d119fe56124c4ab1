use rand::Rng;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of candidate coupon codes. Uniqueness is the caller's concern.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Brand prefix followed by uppercase alphanumerics, e.g. `SEA7KQ2ZD`.
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    prefix: String,
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(prefix: impl Into<String>, length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            length,
        }
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let mut code = String::with_capacity(self.prefix.len() + self.length);
        code.push_str(&self.prefix);
        code.extend(
            (0..self.length).map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char),
        );
        code
    }
}
