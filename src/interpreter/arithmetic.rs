//! Arithmetic evaluation over the parsed expression tree.
//!
//! Integer (i64) semantics with wrapping overflow, C-style truncating
//! division, and bash's recursive variable resolution: a variable whose
//! value is itself an expression evaluates that expression, bounded by a
//! recursion limit.

use crate::ast::{ArithAssignOp, ArithBinaryOp, ArithExpr, ArithUnaryOp, IncDecOp};
use crate::parser::arith_parser::parse_arithmetic;

use super::errors::ExecError;
use super::state::ShellState;

const MAX_RECURSION: u32 = 64;

/// Parse and evaluate an expression from text.
pub fn eval_text(state: &mut ShellState, text: &str) -> Result<i64, ExecError> {
    let expr = parse_arithmetic(text)
        .map_err(|e| ExecError::expansion(format!("arithmetic: {}", e)))?;
    eval(state, &expr)
}

pub fn eval(state: &mut ShellState, expr: &ArithExpr) -> Result<i64, ExecError> {
    eval_depth(state, expr, 0)
}

fn eval_depth(state: &mut ShellState, expr: &ArithExpr, depth: u32) -> Result<i64, ExecError> {
    if depth > MAX_RECURSION {
        return Err(ExecError::expansion("arithmetic: expression recursion level exceeded"));
    }

    match expr {
        ArithExpr::Number(n) => Ok(*n),
        ArithExpr::Variable(name) => resolve_variable(state, name, depth),
        ArithExpr::Element(name, index) => {
            let index = eval_depth(state, index, depth + 1)?;
            let value = element_value(state, name, index);
            numeric_value(state, &value, depth)
        }
        ArithExpr::Unary(op, operand) => {
            let value = eval_depth(state, operand, depth + 1)?;
            Ok(match op {
                ArithUnaryOp::Neg => value.wrapping_neg(),
                ArithUnaryOp::Pos => value,
                ArithUnaryOp::Not => (value == 0) as i64,
                ArithUnaryOp::BitNot => !value,
            })
        }
        ArithExpr::IncDec { op, prefix, target } => {
            let old = eval_depth(state, target, depth + 1)?;
            let new = match op {
                IncDecOp::Inc => old.wrapping_add(1),
                IncDecOp::Dec => old.wrapping_sub(1),
            };
            store(state, target, new, depth)?;
            Ok(if *prefix { new } else { old })
        }
        ArithExpr::Binary(op, lhs, rhs) => {
            // Logical operators short-circuit.
            match op {
                ArithBinaryOp::LogAnd => {
                    let left = eval_depth(state, lhs, depth + 1)?;
                    if left == 0 {
                        return Ok(0);
                    }
                    let right = eval_depth(state, rhs, depth + 1)?;
                    return Ok((right != 0) as i64);
                }
                ArithBinaryOp::LogOr => {
                    let left = eval_depth(state, lhs, depth + 1)?;
                    if left != 0 {
                        return Ok(1);
                    }
                    let right = eval_depth(state, rhs, depth + 1)?;
                    return Ok((right != 0) as i64);
                }
                _ => {}
            }

            let left = eval_depth(state, lhs, depth + 1)?;
            let right = eval_depth(state, rhs, depth + 1)?;
            apply_binary(*op, left, right)
        }
        ArithExpr::Ternary(cond, then, otherwise) => {
            let cond = eval_depth(state, cond, depth + 1)?;
            if cond != 0 {
                eval_depth(state, then, depth + 1)
            } else {
                eval_depth(state, otherwise, depth + 1)
            }
        }
        ArithExpr::Assign { op, target, value } => {
            let rhs = eval_depth(state, value, depth + 1)?;
            let result = match op {
                ArithAssignOp::Assign => rhs,
                _ => {
                    let current = eval_depth(state, target, depth + 1)?;
                    let binary = match op {
                        ArithAssignOp::Add => ArithBinaryOp::Add,
                        ArithAssignOp::Sub => ArithBinaryOp::Sub,
                        ArithAssignOp::Mul => ArithBinaryOp::Mul,
                        ArithAssignOp::Div => ArithBinaryOp::Div,
                        ArithAssignOp::Mod => ArithBinaryOp::Mod,
                        ArithAssignOp::Shl => ArithBinaryOp::Shl,
                        ArithAssignOp::Shr => ArithBinaryOp::Shr,
                        ArithAssignOp::And => ArithBinaryOp::BitAnd,
                        ArithAssignOp::Xor => ArithBinaryOp::BitXor,
                        ArithAssignOp::Or => ArithBinaryOp::BitOr,
                        ArithAssignOp::Assign => unreachable!(),
                    };
                    apply_binary(binary, current, rhs)?
                }
            };
            store(state, target, result, depth)?;
            Ok(result)
        }
        ArithExpr::Comma(first, second) => {
            eval_depth(state, first, depth + 1)?;
            eval_depth(state, second, depth + 1)
        }
    }
}

fn apply_binary(op: ArithBinaryOp, left: i64, right: i64) -> Result<i64, ExecError> {
    Ok(match op {
        ArithBinaryOp::Add => left.wrapping_add(right),
        ArithBinaryOp::Sub => left.wrapping_sub(right),
        ArithBinaryOp::Mul => left.wrapping_mul(right),
        ArithBinaryOp::Div => {
            if right == 0 {
                return Err(ExecError::expansion("arithmetic: division by 0"));
            }
            left.wrapping_div(right)
        }
        ArithBinaryOp::Mod => {
            if right == 0 {
                return Err(ExecError::expansion("arithmetic: division by 0"));
            }
            left.wrapping_rem(right)
        }
        ArithBinaryOp::Pow => {
            if right < 0 {
                return Err(ExecError::expansion("arithmetic: exponent less than 0"));
            }
            let mut result: i64 = 1;
            let mut base = left;
            let mut exp = right as u64;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            result
        }
        ArithBinaryOp::Shl => left.wrapping_shl(right as u32),
        ArithBinaryOp::Shr => left.wrapping_shr(right as u32),
        ArithBinaryOp::Lt => (left < right) as i64,
        ArithBinaryOp::Le => (left <= right) as i64,
        ArithBinaryOp::Gt => (left > right) as i64,
        ArithBinaryOp::Ge => (left >= right) as i64,
        ArithBinaryOp::Eq => (left == right) as i64,
        ArithBinaryOp::Ne => (left != right) as i64,
        ArithBinaryOp::BitAnd => left & right,
        ArithBinaryOp::BitXor => left ^ right,
        ArithBinaryOp::BitOr => left | right,
        ArithBinaryOp::LogAnd | ArithBinaryOp::LogOr => unreachable!(),
    })
}

/// A variable used as a number: empty/unset is 0, a plain number is
/// itself, anything else is evaluated recursively as an expression.
fn resolve_variable(state: &mut ShellState, name: &str, depth: u32) -> Result<i64, ExecError> {
    // Special parameters available inside arithmetic.
    let value = match name {
        "?" => Some(state.last_exit_code.to_string()),
        "#" => Some(state.positional.len().to_string()),
        "$" => Some(std::process::id().to_string()),
        "!" => state.last_background_pid.map(|p| p.to_string()),
        _ => {
            if let Ok(index) = name.parse::<usize>() {
                state.positional_get(index).map(|s| s.to_string())
            } else {
                state.get_string(name)
            }
        }
    };
    numeric_value(state, &value.unwrap_or_default(), depth)
}

fn numeric_value(state: &mut ShellState, value: &str, depth: u32) -> Result<i64, ExecError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }
    let expr = parse_arithmetic(trimmed)
        .map_err(|e| ExecError::expansion(format!("arithmetic: {}", e)))?;
    eval_depth(state, &expr, depth + 1)
}

fn element_value(state: &ShellState, name: &str, index: i64) -> String {
    match state.lookup(name) {
        Some(var) => match &var.value {
            super::vars::Value::Indexed(map) => map.get(&index).cloned().unwrap_or_default(),
            super::vars::Value::Assoc(map) => {
                map.get(&index.to_string()).cloned().unwrap_or_default()
            }
            super::vars::Value::String(s) => {
                if index == 0 {
                    s.clone()
                } else {
                    String::new()
                }
            }
        },
        None => String::new(),
    }
}

fn store(
    state: &mut ShellState,
    target: &ArithExpr,
    value: i64,
    depth: u32,
) -> Result<(), ExecError> {
    match target {
        ArithExpr::Variable(name) => state
            .set_string(name, value.to_string())
            .map_err(ExecError::expansion),
        ArithExpr::Element(name, index) => {
            let index = eval_depth(state, index, depth + 1)?;
            state
                .set_element(name, &index.to_string(), value.to_string())
                .map_err(ExecError::expansion)
        }
        _ => Err(ExecError::expansion("arithmetic: assignment to non-variable")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_str(state: &mut ShellState, text: &str) -> i64 {
        eval_text(state, text).unwrap()
    }

    #[test]
    fn basic_operations() {
        let mut state = ShellState::default();
        assert_eq!(eval_str(&mut state, "1 + 2 * 3"), 7);
        assert_eq!(eval_str(&mut state, "(1 + 2) * 3"), 9);
        assert_eq!(eval_str(&mut state, "10 / 3"), 3);
        assert_eq!(eval_str(&mut state, "10 % 3"), 1);
        assert_eq!(eval_str(&mut state, "-10 / 3"), -3);
        assert_eq!(eval_str(&mut state, "2 ** 10"), 1024);
    }

    #[test]
    fn comparisons_and_logic() {
        let mut state = ShellState::default();
        assert_eq!(eval_str(&mut state, "3 < 5"), 1);
        assert_eq!(eval_str(&mut state, "3 >= 5"), 0);
        assert_eq!(eval_str(&mut state, "1 && 2"), 1);
        assert_eq!(eval_str(&mut state, "0 || 0"), 0);
        assert_eq!(eval_str(&mut state, "!5"), 0);
        assert_eq!(eval_str(&mut state, "~0"), -1);
    }

    #[test]
    fn short_circuit_skips_side_effects() {
        let mut state = ShellState::default();
        assert_eq!(eval_str(&mut state, "0 && (x = 5)"), 0);
        assert_eq!(state.get_string("x"), None);
        assert_eq!(eval_str(&mut state, "1 || (y = 5)"), 1);
        assert_eq!(state.get_string("y"), None);
    }

    #[test]
    fn variables_and_assignment() {
        let mut state = ShellState::default();
        state.set_string("x", "4".to_string()).unwrap();
        assert_eq!(eval_str(&mut state, "x * 2"), 8);
        assert_eq!(eval_str(&mut state, "y = x + 1"), 5);
        assert_eq!(state.get_string("y"), Some("5".to_string()));
        assert_eq!(eval_str(&mut state, "y += 10"), 15);
    }

    #[test]
    fn unset_is_zero() {
        let mut state = ShellState::default();
        assert_eq!(eval_str(&mut state, "nosuch + 3"), 3);
    }

    #[test]
    fn recursive_variable_resolution() {
        let mut state = ShellState::default();
        state.set_string("a", "b + 1".to_string()).unwrap();
        state.set_string("b", "2".to_string()).unwrap();
        assert_eq!(eval_str(&mut state, "a"), 3);
    }

    #[test]
    fn recursion_limit() {
        let mut state = ShellState::default();
        state.set_string("loop", "loop + 1".to_string()).unwrap();
        assert!(eval_text(&mut state, "loop").is_err());
    }

    #[test]
    fn division_by_zero_is_error() {
        let mut state = ShellState::default();
        assert!(eval_text(&mut state, "1 / 0").is_err());
        assert!(eval_text(&mut state, "1 % 0").is_err());
    }

    #[test]
    fn inc_dec_semantics() {
        let mut state = ShellState::default();
        state.set_string("n", "5".to_string()).unwrap();
        assert_eq!(eval_str(&mut state, "n++"), 5);
        assert_eq!(state.get_string("n"), Some("6".to_string()));
        assert_eq!(eval_str(&mut state, "++n"), 7);
        assert_eq!(eval_str(&mut state, "n--"), 7);
        assert_eq!(eval_str(&mut state, "--n"), 5);
    }

    #[test]
    fn ternary_and_comma() {
        let mut state = ShellState::default();
        assert_eq!(eval_str(&mut state, "1 ? 10 : 20"), 10);
        assert_eq!(eval_str(&mut state, "0 ? 10 : 20"), 20);
        assert_eq!(eval_str(&mut state, "a = 1, a + 1"), 2);
    }

    #[test]
    fn array_elements() {
        let mut state = ShellState::default();
        state.set_array("arr", vec!["10".into(), "20".into()], false).unwrap();
        assert_eq!(eval_str(&mut state, "arr[0] + arr[1]"), 30);
        assert_eq!(eval_str(&mut state, "arr[1] = 25"), 25);
        assert_eq!(state.lookup("arr").unwrap().value.elements(), vec!["10", "25"]);
    }

    #[test]
    fn positional_parameters() {
        let mut state = ShellState::default();
        state.positional = vec!["7".into()];
        assert_eq!(eval_str(&mut state, "$1 + 1"), 8);
    }
}
