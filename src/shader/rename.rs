//! Identifier scanning and namespacing for WGSL fragments.
//!
//! Effects are written independently, so two of them may both declare a helper called
//! `luma` or a uniform called `strength`. Before their code is concatenated each effect
//! gets its own namespace: every identifier the fragment declares is rewritten with a
//! per-effect prefix, and every uniform name is redirected into the shared uniform block.
//!
//! The scanner understands just enough WGSL to do this safely:
//! line and (nested) block comments, number literals, member access, function
//! parameter lists and struct bodies. An identifier directly preceded by `.` is a field
//! or swizzle and is never renamed. Parameters and struct members bind names of their
//! own and keep them.

use rustc_hash::FxHashMap;

/// Keywords introducing a declaration whose name follows.
const DECLARATION_KEYWORDS: [&str; 7] = ["fn", "const", "struct", "alias", "var", "let", "override"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Ident(&'a str),
    Comment(&'a str),
    Other(&'a str),
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(src: &str) -> Vec<Token<'_>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;

        if bytes[i..].starts_with(b"//") {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            tokens.push(Token::Comment(&src[start..i]));
        } else if bytes[i..].starts_with(b"/*") {
            let mut depth = 0usize;
            while i < bytes.len() {
                if bytes[i..].starts_with(b"/*") {
                    depth += 1;
                    i += 2;
                } else if bytes[i..].starts_with(b"*/") {
                    depth -= 1;
                    i += 2;
                    if depth == 0 {
                        break;
                    }
                } else {
                    i += 1;
                }
            }
            tokens.push(Token::Comment(&src[start..i]));
        } else if is_ident_start(c) {
            while i < bytes.len() && is_ident_continue(bytes[i] as char) {
                i += 1;
            }
            tokens.push(Token::Ident(&src[start..i]));
        } else if c.is_ascii_digit() {
            // Literals such as 1.5, 0x1fu, 1e4 or 2.0f are swallowed whole.
            while i < bytes.len() && (is_ident_continue(bytes[i] as char) || bytes[i] == b'.') {
                i += 1;
            }
            tokens.push(Token::Other(&src[start..i]));
        } else {
            i += c.len_utf8().max(1);
            while i < bytes.len() && !src.is_char_boundary(i) {
                i += 1;
            }
            tokens.push(Token::Other(&src[start..i]));
        }
    }

    tokens
}

/// Index of the next token that is neither whitespace nor a comment.
fn next_significant(tokens: &[Token<'_>], mut i: usize) -> Option<usize> {
    while i < tokens.len() {
        match tokens[i] {
            Token::Comment(_) => {}
            Token::Other(s) if s.trim().is_empty() => {}
            _ => return Some(i),
        }
        i += 1;
    }
    None
}

/// Returns every name declared in `src` (functions, constants, structs, aliases,
/// variables and overrides), in order of first appearance, without duplicates.
pub fn declared_identifiers(src: &str) -> Vec<String> {
    let tokens = tokenize(src);
    let mut names: Vec<String> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        if let Token::Ident(word) = tokens[i] {
            if DECLARATION_KEYWORDS.contains(&word) {
                let mut j = next_significant(&tokens, i + 1);

                // var<private>, var<uniform>, ...
                if word == "var" {
                    if let Some(k) = j {
                        if tokens[k] == Token::Other("<") {
                            let mut k = k;
                            while k < tokens.len() && tokens[k] != Token::Other(">") {
                                k += 1;
                            }
                            j = next_significant(&tokens, k + 1);
                        }
                    }
                }

                if let Some(k) = j {
                    if let Token::Ident(name) = tokens[k] {
                        if !names.iter().any(|n| n == name) {
                            names.push(name.to_string());
                        }
                        i = k;
                    }
                }
            }
        }
        i += 1;
    }

    names
}

/// Returns `true` if `src` declares a function named `name`.
pub fn declares_function(src: &str, name: &str) -> bool {
    let tokens = tokenize(src);
    tokens.iter().enumerate().any(|(i, t)| {
        *t == Token::Ident("fn")
            && next_significant(&tokens, i + 1).is_some_and(|k| tokens[k] == Token::Ident(name))
    })
}

/// Returns `true` if `name` is a valid (ASCII) WGSL identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_continue) && name != "_"
}

/// Where the renamer is, relative to the declarations that bind names locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    TopLevel,
    /// Between `fn name` and its `(`.
    FnName,
    /// Inside a parameter list, at the given parenthesis depth.
    Params(usize),
    /// Between the parameter list and the body (return type).
    Signature,
    /// Inside a function body, at the given brace depth.
    Body(usize),
    /// Between `struct Name` and its `{`.
    StructName,
    /// Inside a struct body, at the given brace depth.
    Members(usize),
}

impl Scope {
    fn enter(self, token: Token<'_>) -> Self {
        match (self, token) {
            (Self::TopLevel, Token::Ident("fn")) => Self::FnName,
            (Self::TopLevel, Token::Ident("struct")) => Self::StructName,
            (Self::FnName, Token::Other("(")) => Self::Params(1),
            (Self::Params(d), Token::Other("(")) => Self::Params(d + 1),
            (Self::Params(1), Token::Other(")")) => Self::Signature,
            (Self::Params(d), Token::Other(")")) => Self::Params(d - 1),
            (Self::Signature, Token::Other("{")) => Self::Body(1),
            (Self::Body(d), Token::Other("{")) => Self::Body(d + 1),
            (Self::Body(1), Token::Other("}")) => Self::TopLevel,
            (Self::Body(d), Token::Other("}")) => Self::Body(d - 1),
            (Self::StructName, Token::Other("{")) => Self::Members(1),
            (Self::Members(d), Token::Other("{")) => Self::Members(d + 1),
            (Self::Members(1), Token::Other("}")) => Self::TopLevel,
            (Self::Members(d), Token::Other("}")) => Self::Members(d - 1),
            (scope, _) => scope,
        }
    }
}

/// Rewrites every identifier of `src` found in `map`.
///
/// Left untouched:
///
/// - identifiers used as members (`a.name`) and text inside comments;
/// - struct member declarations;
/// - function parameters, both where they are declared and where the function body
///   uses them, since a parameter shadows any uniform or global of the same name.
pub fn rename_identifiers(src: &str, map: &FxHashMap<String, String>) -> String {
    let tokens = tokenize(src);
    let mut out = String::with_capacity(src.len() + src.len() / 4);
    let mut previous_significant: Option<Token<'_>> = None;
    let mut scope = Scope::TopLevel;
    let mut params: Vec<&str> = Vec::new();

    for (i, token) in tokens.iter().copied().enumerate() {
        match token {
            Token::Ident(name) => {
                let is_member = previous_significant == Some(Token::Other("."));
                let declares = next_significant(&tokens, i + 1).is_some_and(|k| tokens[k] == Token::Other(":"));
                let keep = is_member
                    || match scope {
                        Scope::Params(1) if declares => {
                            params.push(name);
                            true
                        }
                        Scope::Members(1) => declares,
                        Scope::Params(_) | Scope::Signature | Scope::Body(_) => params.contains(&name),
                        _ => false,
                    };
                match map.get(name) {
                    Some(replacement) if !keep => out.push_str(replacement),
                    _ => out.push_str(name),
                }
                previous_significant = Some(token);
            }
            Token::Comment(text) => out.push_str(text),
            Token::Other(text) => {
                out.push_str(text);
                if !text.trim().is_empty() {
                    previous_significant = Some(token);
                }
            }
        }

        let next = scope.enter(token);
        if next == Scope::FnName || next == Scope::TopLevel {
            params.clear();
        }
        scope = next;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = r#"
        // fn commented_out() is not a declaration
        const WEIGHTS = array<f32, 3>(0.25, 0.5, 0.25);
        struct Sample { value: vec4f }
        var<private> seed: f32 = 1e-3;

        fn luma(c: vec3f) -> f32 {
            return dot(c, vec3f(0.299, 0.587, 0.114));
        }

        fn transform(color: vec4f, uv: vec2f) -> vec4f {
            let l = luma(color.rgb) * strength;
            var s: Sample;
            s.value = vec4f(vec3f(l), color.a);
            return s.value;
        }
    "#;

    #[test]
    fn finds_declarations_in_order() {
        let names = declared_identifiers(FRAGMENT);
        assert_eq!(names, vec!["WEIGHTS", "Sample", "seed", "luma", "transform", "l", "s"]);
    }

    #[test]
    fn detects_transform_function() {
        assert!(declares_function(FRAGMENT, "transform"));
        assert!(!declares_function(FRAGMENT, "commented_out"));
    }

    #[test]
    fn renames_declarations_and_uniforms_but_not_members() {
        let mut map = FxHashMap::default();
        for name in declared_identifiers(FRAGMENT) {
            map.insert(name.clone(), format!("e0_{name}"));
        }
        map.insert("strength".to_string(), "fx.e0_strength".to_string());

        let out = rename_identifiers(FRAGMENT, &map);
        assert!(out.contains("fn e0_luma(c: vec3f)"));
        assert!(out.contains("fn e0_transform(color: vec4f, uv: vec2f)"));
        assert!(out.contains("e0_luma(color.rgb) * fx.e0_strength"));
        assert!(out.contains("e0_s.value = vec4f"));
        assert!(out.contains("var<private> e0_seed: f32 = 1e-3;"));
        assert!(out.contains("// fn commented_out() is not a declaration"));
        assert!(out.contains("struct e0_Sample { value: vec4f }"));
        assert!(out.contains("var e0_s: e0_Sample;"));
    }

    #[test]
    fn number_literals_are_not_identifiers() {
        let mut map = FxHashMap::default();
        map.insert("e4".to_string(), "oops".to_string());
        map.insert("f".to_string(), "oops".to_string());
        assert_eq!(rename_identifiers("let a = 1e4 + 2.0f;", &map), "let a = 1e4 + 2.0f;");
    }

    #[test]
    fn nested_block_comments() {
        let src = "/* outer /* inner */ still comment fn hidden() */ fn visible() {}";
        assert_eq!(declared_identifiers(src), vec!["visible"]);
    }

    #[test]
    fn non_ascii_comments_are_skipped() {
        let src = "/* café, naïve */ fn transform() {} // ∂x/∂y\nconst K = 1.0;";
        assert_eq!(declared_identifiers(src), vec!["transform", "K"]);
        assert!(declares_function("/* é */ fn transform() {}", "transform"));

        let mut map = FxHashMap::default();
        map.insert("K".to_string(), "e0_K".to_string());
        assert_eq!(rename_identifiers("/* ü */ K", &map), "/* ü */ e0_K");
    }

    #[test]
    fn parameters_shadow_uniforms_in_their_function() {
        let src = "fn boost(amount: f32, c: vec3f) -> vec3f { return c * amount; }\n\
                   fn transform(color: vec4f, uv: vec2f) -> vec4f { return vec4f(boost(amount, color.rgb), color.a); }";
        let mut map = FxHashMap::default();
        map.insert("amount".to_string(), "fx.e0_amount".to_string());
        map.insert("boost".to_string(), "e0_boost".to_string());

        let out = rename_identifiers(src, &map);
        assert!(out.contains("fn e0_boost(amount: f32, c: vec3f) -> vec3f { return c * amount; }"));
        assert!(out.contains("vec4f(e0_boost(fx.e0_amount, color.rgb), color.a)"));
    }

    #[test]
    fn struct_members_keep_their_names() {
        let src = "struct Tint { amount: f32, color: vec3f }\n\
                   fn make() -> Tint { var t: Tint; t.amount = amount; return t; }";
        let mut map = FxHashMap::default();
        map.insert("amount".to_string(), "fx.e0_amount".to_string());
        map.insert("Tint".to_string(), "e0_Tint".to_string());
        map.insert("t".to_string(), "e0_t".to_string());

        let out = rename_identifiers(src, &map);
        assert!(out.contains("struct e0_Tint { amount: f32, color: vec3f }"));
        assert!(out.contains("var e0_t: e0_Tint; e0_t.amount = fx.e0_amount;"));
    }

    #[test]
    fn identifier_validation() {
        assert!(is_identifier("strength"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("with space"));
        assert!(!is_identifier("_"));
        assert!(!is_identifier(""));
    }
}
