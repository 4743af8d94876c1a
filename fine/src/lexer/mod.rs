//! Lexer implementation using logos

mod token;

pub use token::Token;

use crate::ast::Span;
use crate::error::{CompileError, Result};
use logos::Logos;

/// Tokenize source code
pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        let span = Span::from(lexer.span());
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(_) => {
                let message = if lexer.slice().starts_with(['"', '\'']) {
                    "unterminated string literal".to_string()
                } else {
                    format!("unexpected character: {:?}", lexer.slice())
                };
                return Err(CompileError::lexer(message, span));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_keywords() {
        assert_eq!(
            kinds("let fn if else for while return in parallel"),
            vec![
                Token::Let,
                Token::Fn,
                Token::If,
                Token::Else,
                Token::For,
                Token::While,
                Token::Return,
                Token::In,
                Token::Parallel
            ]
        );
    }

    #[test]
    fn test_tokenize_object_and_exception_keywords() {
        assert_eq!(
            kinds("class new this extends super try catch throw finally assert"),
            vec![
                Token::Class,
                Token::New,
                Token::This,
                Token::Extends,
                Token::Super,
                Token::Try,
                Token::Catch,
                Token::Throw,
                Token::Finally,
                Token::Assert
            ]
        );
    }

    #[test]
    fn test_builtin_names_are_identifiers() {
        let toks = kinds("print range len sum");
        assert!(toks.iter().all(|t| matches!(t, Token::Ident(_))));
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(kinds("42 3.5"), vec![Token::Number(42.0), Token::Number(3.5)]);
    }

    #[test]
    fn test_number_followed_by_method_dot() {
        assert_eq!(
            kinds("1.x"),
            vec![Token::Number(1.0), Token::Dot, Token::Ident("x".to_string())]
        );
    }

    #[test]
    fn test_tokenize_strings_both_quotes() {
        assert_eq!(
            kinds(r#""hi\n" 'there'"#),
            vec![Token::Str("hi\n".to_string()), Token::Str("there".to_string())]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("+ - -> * / // % @ !"),
            vec![
                Token::Plus,
                Token::Minus,
                Token::Arrow,
                Token::Star,
                Token::Slash,
                Token::SlashSlash,
                Token::Percent,
                Token::At,
                Token::Bang
            ]
        );
    }

    #[test]
    fn test_tokenize_comparison_operators() {
        assert_eq!(
            kinds("== != < <= > >= ="),
            vec![
                Token::EqEq,
                Token::NotEq,
                Token::Lt,
                Token::LtEq,
                Token::Gt,
                Token::GtEq,
                Token::Eq
            ]
        );
    }

    #[test]
    fn test_tokenize_skips_hash_comments() {
        assert_eq!(
            kinds("let # a comment\nx"),
            vec![Token::Let, Token::Ident("x".to_string())]
        );
    }

    #[test]
    fn test_tokenize_spans() {
        let tokens = tokenize("let x").unwrap();
        assert_eq!(tokens[0].1, Span::new(0, 3));
        assert_eq!(tokens[1].1, Span::new(4, 5));
    }

    #[test]
    fn test_tokenize_unexpected_character() {
        let err = tokenize("let $x").unwrap_err();
        assert!(matches!(err, CompileError::Lexer { .. }));
        assert_eq!(err.span(), Some(Span::new(4, 5)));
    }

    #[test]
    fn test_tokenize_unterminated_string() {
        let err = tokenize("\"abc").unwrap_err();
        assert!(err.message().contains("unterminated"));
    }
}
