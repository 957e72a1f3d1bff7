//! Dot-command sub-grammars.

use std::path::PathBuf;

use indexmap::IndexMap;
use spicenet_core::expr::Expr;

use crate::error::{Error, Result, ScopeKind};
use crate::expr::ExprParser;
use crate::lexer::{Token, TokenKind, tokenize};

use super::types::{AnalysisCard, DataTable, ModelCard, ScopeDef, Statement};
use super::{MAX_INCLUDE_DEPTH, Parser, parse_fragment, parse_pairs};

/// Structural commands the main loop does not handle textually.
pub(super) fn parse_dot(
    parser: &mut Parser,
    command: &str,
    tokens: &[Token],
    line: usize,
) -> Result<()> {
    match command {
        "model" => parse_model(parser, tokens, line),
        "param" | "params" => parse_param(parser, tokens, line),
        "subckt" => parse_subckt(parser, tokens, line),
        "ends" => {
            let name = tokens.first().map(|t| t.text.as_str());
            parser.close_scope(ScopeKind::Subcircuit, name, line)
        }
        "data" => parse_data(parser, tokens, line),
        "enddata" => Err(Error::Parse {
            line,
            message: ".enddata without an open .data block".to_string(),
        }),
        "global" => parse_global(parser, tokens, line),
        "options" | "option" => parse_options(parser, tokens, line),
        "ic" => {
            let entries = parse_node_values(tokens, line)?;
            parser.append(Statement::InitialCondition(entries));
            Ok(())
        }
        "nodeset" => {
            let entries = parse_node_values(tokens, line)?;
            parser.append(Statement::NodeSet(entries));
            Ok(())
        }
        _ => parse_analysis(parser, command, tokens, line),
    }
}

/// `.model mname type (pname1=pval1 ...)` — parentheses optional.
fn parse_model(parser: &mut Parser, tokens: &[Token], line: usize) -> Result<()> {
    let mut pos = 0;
    let name = expect_word(tokens, &mut pos, line, "model name")?;
    let model_type = expect_word(tokens, &mut pos, line, "model type")?;

    let body = match tokens.get(pos).map(|t| t.kind) {
        Some(TokenKind::LParen) => {
            let last = tokens.last().expect("nonempty");
            if last.kind != TokenKind::RParen {
                return Err(Error::Parse {
                    line,
                    message: "unterminated parameter list in .model".to_string(),
                });
            }
            &tokens[pos + 1..tokens.len() - 1]
        }
        _ => &tokens[pos..],
    };

    let mut parameters = IndexMap::new();
    for (key, value) in parse_pairs(body, 0, line)? {
        parameters.insert(key, value);
    }

    parser.append(Statement::Model(ModelCard {
        name: name.to_ascii_lowercase(),
        model_type: model_type.to_ascii_lowercase(),
        parameters,
        line,
    }));
    Ok(())
}

/// `.param name=expr [name=expr ...]`
fn parse_param(parser: &mut Parser, tokens: &[Token], line: usize) -> Result<()> {
    let mut bindings = IndexMap::new();
    for (key, value) in parse_pairs(tokens, 0, line)? {
        let Some(value) = value else {
            return Err(Error::Parse {
                line,
                message: format!("parameter '{}' has no value", key),
            });
        };
        bindings.insert(key, value);
    }
    if bindings.is_empty() {
        return Err(Error::Parse {
            line,
            message: ".param line has no bindings".to_string(),
        });
    }
    parser.append(Statement::Param(bindings));
    Ok(())
}

/// `.subckt name node1 ... [params: p1=v1 ...]`
fn parse_subckt(parser: &mut Parser, tokens: &[Token], line: usize) -> Result<()> {
    let mut pos = 0;
    let name = expect_word(tokens, &mut pos, line, "subcircuit name")?.to_ascii_lowercase();

    let mut nodes = Vec::new();
    while let Some(token) = tokens.get(pos) {
        if token.is_id("params")
            && tokens.get(pos + 1).map(|t| t.kind) == Some(TokenKind::Colon)
        {
            pos += 2;
            break;
        }
        match token.kind {
            TokenKind::Id | TokenKind::Number => {
                // A name followed by '=' starts the defaults, even
                // without the params: marker.
                if tokens.get(pos + 1).map(|t| t.kind) == Some(TokenKind::Assign) {
                    break;
                }
                nodes.push(token.text.to_ascii_lowercase());
                pos += 1;
            }
            _ => {
                return Err(Error::Parse {
                    line,
                    message: format!("unexpected '{}' in .subckt header", token.text),
                });
            }
        }
    }

    let mut defaults = IndexMap::new();
    for (key, value) in parse_pairs(&tokens[pos..], 0, line)? {
        let Some(value) = value else {
            return Err(Error::Parse {
                line,
                message: format!("subcircuit parameter '{}' has no default", key),
            });
        };
        defaults.insert(key, value);
    }

    parser.open_scope(
        ScopeKind::Subcircuit,
        ScopeDef {
            name,
            nodes,
            defaults,
            body: Vec::new(),
            line,
        },
    );
    Ok(())
}

/// `.data name col1 col2 ...` followed by rows of numbers up to
/// `.enddata`.
fn parse_data(parser: &mut Parser, tokens: &[Token], line: usize) -> Result<()> {
    let mut pos = 0;
    let name = expect_word(tokens, &mut pos, line, "table name")?.to_ascii_lowercase();

    let mut columns: IndexMap<String, Vec<f64>> = IndexMap::new();
    for token in &tokens[pos..] {
        if token.kind != TokenKind::Id {
            return Err(Error::Parse {
                line,
                message: format!("expected column name, found '{}'", token.text),
            });
        }
        columns.insert(token.text.to_ascii_lowercase(), Vec::new());
    }
    if columns.is_empty() {
        return Err(Error::Parse {
            line,
            message: ".data block has no columns".to_string(),
        });
    }

    let width = columns.len();
    let mut filled = 0usize;
    loop {
        let Some(row) = parser.take_raw_line() else {
            return Err(Error::Parse {
                line,
                message: format!(".data {} is never closed by .enddata", name),
            });
        };
        let lower = row.text.to_ascii_lowercase();
        if lower.starts_with(".enddata") {
            break;
        }
        let row_tokens = tokenize(&row)?;
        let mut pos = 0;
        while pos < row_tokens.len() {
            // Rows are bare signed numbers, never expressions; `1 -2`
            // is two values.
            let negative = row_tokens[pos].kind == TokenKind::Minus;
            if negative || row_tokens[pos].kind == TokenKind::Plus {
                pos += 1;
            }
            let value = match row_tokens.get(pos) {
                Some(t) if t.kind == TokenKind::Number => {
                    t.scaled_value().expect("number token")
                }
                _ => {
                    return Err(Error::Parse {
                        line: row.line,
                        message: "expected numeric value in .data row".to_string(),
                    });
                }
            };
            pos += 1;
            let column = columns
                .get_index_mut(filled % width)
                .expect("index within width")
                .1;
            column.push(if negative { -value } else { value });
            filled += 1;
        }
    }

    parser.append(Statement::Data(DataTable { name, columns }));
    Ok(())
}

fn parse_global(parser: &mut Parser, tokens: &[Token], line: usize) -> Result<()> {
    let mut nodes = Vec::new();
    for token in tokens {
        match token.kind {
            TokenKind::Id | TokenKind::Number => nodes.push(token.text.to_ascii_lowercase()),
            _ => {
                return Err(Error::Parse {
                    line,
                    message: format!("expected node name in .global, found '{}'", token.text),
                });
            }
        }
    }
    parser.append(Statement::Global(nodes));
    Ok(())
}

fn parse_options(parser: &mut Parser, tokens: &[Token], line: usize) -> Result<()> {
    let mut options = IndexMap::new();
    for (key, value) in parse_pairs(tokens, 0, line)? {
        options.insert(key, value);
    }
    parser.append(Statement::Options(options));
    Ok(())
}

/// `v(node)=value` pairs for `.ic` and `.nodeset`.
fn parse_node_values(tokens: &[Token], line: usize) -> Result<Vec<(String, f64)>> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < tokens.len() {
        let probe = tokens[pos].is_id("v");
        if !probe {
            return Err(Error::Parse {
                line,
                message: format!("expected v(node)=value, found '{}'", tokens[pos].text),
            });
        }
        pos += 1;
        expect_kind(tokens, &mut pos, TokenKind::LParen, line)?;
        let node = match tokens.get(pos) {
            Some(t) if matches!(t.kind, TokenKind::Id | TokenKind::Number) => {
                t.text.to_ascii_lowercase()
            }
            _ => {
                return Err(Error::Parse {
                    line,
                    message: "expected node name in v()".to_string(),
                });
            }
        };
        pos += 1;
        expect_kind(tokens, &mut pos, TokenKind::RParen, line)?;
        expect_kind(tokens, &mut pos, TokenKind::Assign, line)?;

        let mut sub = ExprParser::new(&tokens[pos..]);
        let expr = sub.parse_one()?;
        pos += sub.pos();
        let Some(value) = expr.as_number() else {
            return Err(Error::Parse {
                line,
                message: format!("initial condition for node {} is not a number", node),
            });
        };
        entries.push((node, value));
    }
    Ok(entries)
}

/// Any other directive becomes a generic analysis card and is carried
/// through to the circuit untouched (`.op`, `.dc`, `.ac`, `.tran`,
/// `.noise`, `.save`, `.temp`, ...).
fn parse_analysis(
    parser: &mut Parser,
    command: &str,
    tokens: &[Token],
    line: usize,
) -> Result<()> {
    const KNOWN: &[&str] = &[
        "op", "dc", "ac", "tran", "noise", "four", "pz", "sens", "tf", "disto", "save", "print",
        "plot", "probe", "meas", "measure", "temp", "width", "func", "csparam",
    ];
    if !KNOWN.contains(&command) {
        log::debug!("passing through unrecognized directive .{command} at line {line}");
    }

    let mut args: Vec<Expr> = Vec::new();
    let mut keywords = IndexMap::new();
    let mut pos = 0;
    while pos < tokens.len() {
        if tokens[pos].kind == TokenKind::Id
            && tokens.get(pos + 1).map(|t| t.kind) == Some(TokenKind::Assign)
        {
            let key = tokens[pos].text.to_ascii_lowercase();
            let mut sub = ExprParser::new(&tokens[pos + 2..]);
            let value = sub.parse_one()?;
            pos += 2 + sub.pos();
            keywords.insert(key, value);
            continue;
        }
        let mut sub = ExprParser::new(&tokens[pos..]);
        args.push(sub.parse_one()?);
        pos += sub.pos();
    }

    parser.append(Statement::Analysis(AnalysisCard {
        kind: command.to_string(),
        args,
        keywords,
        line,
    }));
    Ok(())
}

/// `.include path` — raw text after the command, quotes stripped.
pub(super) fn parse_include(parser: &mut Parser, rest: &str, line: usize) -> Result<()> {
    let path_text = rest.trim().trim_matches('"');
    if path_text.is_empty() {
        return Err(Error::Parse {
            line,
            message: ".include has no file path".to_string(),
        });
    }
    if parser.include_depth() >= MAX_INCLUDE_DEPTH {
        return Err(Error::Parse {
            line,
            message: format!("includes nested deeper than {}", MAX_INCLUDE_DEPTH),
        });
    }

    let mut path = PathBuf::from(path_text);
    if path.is_relative()
        && let Some(base) = parser.base_dir()
    {
        path = base.join(path);
    }

    log::debug!("including {}", path.display());
    let depth = parser.include_depth() + 1;
    let tree = parse_fragment(&path, depth).map_err(|e| e.included_from(&path, line))?;

    // Included definitions merge into the current scope; name collisions
    // are hard errors because resolution could otherwise pick either.
    for statement in &tree.statements {
        match statement {
            Statement::Model(card) => {
                if !parser.note_model(card.name.clone()) {
                    return Err(Error::DuplicateDefinition {
                        name: card.name.clone(),
                        path,
                    });
                }
            }
            Statement::SubCircuit(def) => {
                if !parser.note_subcircuit(def.name.clone()) {
                    return Err(Error::DuplicateDefinition {
                        name: def.name.clone(),
                        path,
                    });
                }
            }
            _ => {}
        }
    }

    parser.append(Statement::Include {
        path,
        contents: tree.statements,
    });
    Ok(())
}

/// `.lib entry` opens a definition block; `.lib path entry` calls into a
/// library file.
pub(super) fn parse_lib(parser: &mut Parser, rest: &str, line: usize) -> Result<()> {
    let words: Vec<&str> = rest.split_whitespace().collect();
    match words.as_slice() {
        [entry] => {
            parser.open_scope(
                ScopeKind::Library,
                ScopeDef {
                    name: entry.to_ascii_lowercase(),
                    nodes: Vec::new(),
                    defaults: IndexMap::new(),
                    body: Vec::new(),
                    line,
                },
            );
            Ok(())
        }
        [path, entry] => {
            parser.append(Statement::LibraryCall {
                path: PathBuf::from(path.trim_matches('"')),
                entry: entry.to_ascii_lowercase(),
            });
            Ok(())
        }
        _ => Err(Error::Parse {
            line,
            message: ".lib expects an entry name or a path and entry".to_string(),
        }),
    }
}

fn expect_word<'a>(
    tokens: &'a [Token],
    pos: &mut usize,
    line: usize,
    what: &str,
) -> Result<&'a str> {
    match tokens.get(*pos) {
        Some(token) if matches!(token.kind, TokenKind::Id | TokenKind::Number) => {
            *pos += 1;
            Ok(&token.text)
        }
        found => Err(Error::Parse {
            line,
            message: format!(
                "expected {}, found {}",
                what,
                found.map_or("end of line".to_string(), |t| format!("'{}'", t.text))
            ),
        }),
    }
}

fn expect_kind(tokens: &[Token], pos: &mut usize, kind: TokenKind, line: usize) -> Result<()> {
    match tokens.get(*pos) {
        Some(token) if token.kind == kind => {
            *pos += 1;
            Ok(())
        }
        found => Err(Error::Parse {
            line,
            message: format!(
                "expected {:?}, found {}",
                kind,
                found.map_or("end of line".to_string(), |t| format!("'{}'", t.text))
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Statement, parse};

    #[test]
    fn test_model_with_parens() {
        let tree = parse("t\n.MODEL DMOD D (IS=1e-12 N=2)\n.end\n").unwrap();
        let model = tree.models().next().unwrap();
        assert_eq!(model.name, "dmod");
        assert_eq!(model.model_type, "d");
        assert_eq!(
            model.parameters["is"].as_ref().unwrap().as_number(),
            Some(1e-12)
        );
        assert_eq!(model.parameters["n"].as_ref().unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn test_model_without_parens() {
        let tree = parse("t\n.model swmod sw vt=1 ron=10\n.end\n").unwrap();
        let model = tree.models().next().unwrap();
        assert_eq!(model.parameters.len(), 2);
    }

    #[test]
    fn test_param_multiple_bindings() {
        let tree = parse("t\n.param R_val=1k C_val=10u V_val=5\n.end\n").unwrap();
        match &tree.statements[0] {
            Statement::Param(bindings) => {
                assert_eq!(bindings.len(), 3);
                assert_eq!(bindings["r_val"].as_number(), Some(1000.0));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_param_expression() {
        let tree = parse("t\n.param freq=1MEG period={1/freq}\n.end\n").unwrap();
        match &tree.statements[0] {
            Statement::Param(bindings) => {
                assert_eq!(bindings["freq"].as_number(), Some(1e6));
                assert!(bindings["period"].as_number().is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_subckt_header_with_defaults() {
        let tree = parse("t\n.subckt rcfilt in out params: r=1k c=1u\nR1 in out {r}\n.ends\n.end\n")
            .unwrap();
        let def = tree.subcircuits().next().unwrap();
        assert_eq!(def.nodes, vec!["in", "out"]);
        assert_eq!(def.defaults["r"].as_number(), Some(1000.0));
        assert_eq!(def.defaults["c"].as_number(), Some(1e-6));
    }

    #[test]
    fn test_subckt_defaults_without_marker() {
        let tree = parse("t\n.subckt res a b r=1k\nR1 a b {r}\n.ends\n.end\n").unwrap();
        let def = tree.subcircuits().next().unwrap();
        assert_eq!(def.nodes, vec!["a", "b"]);
        assert_eq!(def.defaults["r"].as_number(), Some(1000.0));
    }

    #[test]
    fn test_analysis_cards() {
        let tree = parse("t\nV1 1 0 10\n.op\n.dc V1 0 10 0.5\n.ac dec 10 1 1meg\n.end\n").unwrap();
        let analyses: Vec<_> = tree
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Analysis(card) => Some(card),
                _ => None,
            })
            .collect();
        assert_eq!(analyses.len(), 3);
        assert_eq!(analyses[0].kind, "op");
        assert_eq!(analyses[1].kind, "dc");
        assert_eq!(analyses[1].args.len(), 4);
        assert_eq!(analyses[2].args.len(), 4);
    }

    #[test]
    fn test_ic_command() {
        let tree = parse("t\nR1 1 0 1k\n.ic v(1)=2.5 v(out)=-1\n.end\n").unwrap();
        let ic = tree
            .statements
            .iter()
            .find_map(|s| match s {
                Statement::InitialCondition(entries) => Some(entries),
                _ => None,
            })
            .unwrap();
        assert_eq!(ic.len(), 2);
        assert_eq!(ic[0], ("1".to_string(), 2.5));
        assert_eq!(ic[1], ("out".to_string(), -1.0));
    }

    #[test]
    fn test_global_and_options() {
        let tree = parse("t\n.global vdd vss\n.options reltol=1e-4 noacct\n.end\n").unwrap();
        assert!(matches!(
            &tree.statements[0],
            Statement::Global(nodes) if nodes == &vec!["vdd".to_string(), "vss".to_string()]
        ));
        match &tree.statements[1] {
            Statement::Options(options) => {
                assert_eq!(
                    options["reltol"].as_ref().unwrap().as_number(),
                    Some(1e-4)
                );
                assert!(options["noacct"].is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_data_block() {
        let tree = parse("t\n.data tab vin vout\n1 2\n3 4\n5 6\n.enddata\n.end\n").unwrap();
        match &tree.statements[0] {
            Statement::Data(table) => {
                assert_eq!(table.name, "tab");
                assert_eq!(table.columns["vin"], vec![1.0, 3.0, 5.0]);
                assert_eq!(table.columns["vout"], vec![2.0, 4.0, 6.0]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_data_block() {
        assert!(parse("t\n.data tab x\n1\n.end\n").is_err());
    }
}
