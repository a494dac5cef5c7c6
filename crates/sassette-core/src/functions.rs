//! Built-in functions. Anything not listed here is emitted as a plain CSS
//! function call.

use crate::value::{Color, Number, Value, ValueError};

/// Call a built-in. Returns `None` when `name` is not one, or when the
/// arguments only make sense as plain CSS (e.g. `rgb(var(--r), 0, 0)`).
pub fn call(name: &str, args: &[Value]) -> Option<Result<Value, ValueError>> {
    let result = match name.to_ascii_lowercase().as_str() {
        "rgb" | "rgba" => return rgb(name, args),
        "lighten" => adjust_lightness(name, args, 1.0),
        "darken" => adjust_lightness(name, args, -1.0),
        "percentage" => percentage(args),
        "round" => map_number(name, args, f64::round),
        "ceil" => map_number(name, args, f64::ceil),
        "floor" => map_number(name, args, f64::floor),
        "abs" => map_number(name, args, f64::abs),
        "min" => return extremum(args, |a, b| a < b),
        "max" => return extremum(args, |a, b| a > b),
        "unquote" => unquote(args),
        "quote" => quote(args),
        _ => return None,
    };
    Some(result)
}

fn expect_arity(name: &str, args: &[Value], count: usize) -> Result<(), ValueError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(ValueError::bad_argument(format!(
            "{name}() takes {count} argument{}, {} given",
            if count == 1 { "" } else { "s" },
            args.len()
        )))
    }
}

fn number_arg<'a>(name: &str, value: &'a Value) -> Result<&'a Number, ValueError> {
    match value {
        Value::Number(number) => Ok(number),
        other => Err(ValueError::bad_argument(format!(
            "{name}() expects a number, got {}",
            other.type_name()
        ))),
    }
}

fn color_arg<'a>(name: &str, value: &'a Value) -> Result<&'a Color, ValueError> {
    match value {
        Value::Color(color) => Ok(color),
        other => Err(ValueError::bad_argument(format!(
            "{name}() expects a color, got {}",
            other.type_name()
        ))),
    }
}

/// A channel given as `0..=255` or as a percentage.
fn channel(number: &Number) -> f64 {
    if number.unit == "%" {
        number.value * 255.0 / 100.0
    } else {
        number.value
    }
}

fn alpha(number: &Number) -> f64 {
    if number.unit == "%" {
        number.value / 100.0
    } else {
        number.value
    }
}

fn rgb(name: &str, args: &[Value]) -> Option<Result<Value, ValueError>> {
    match args {
        [Value::Color(color), Value::Number(a)] => {
            let mut color = color.clone();
            color.alpha = alpha(a).clamp(0.0, 1.0);
            color.original = None;
            Some(Ok(Value::Color(color)))
        }
        [Value::Number(r), Value::Number(g), Value::Number(b)] => Some(Ok(Value::Color(
            Color::rgba(channel(r), channel(g), channel(b), 1.0),
        ))),
        [Value::Number(r), Value::Number(g), Value::Number(b), Value::Number(a)] => Some(Ok(
            Value::Color(Color::rgba(channel(r), channel(g), channel(b), alpha(a))),
        )),
        _ if args.iter().all(|arg| matches!(arg, Value::Number(_) | Value::Color(_))) => {
            Some(Err(ValueError::bad_argument(format!(
                "{name}() takes 3 or 4 numbers, or a color and an alpha"
            ))))
        }
        _ => None,
    }
}

fn adjust_lightness(name: &str, args: &[Value], direction: f64) -> Result<Value, ValueError> {
    expect_arity(name, args, 2)?;
    let color = color_arg(name, &args[0])?;
    let amount = number_arg(name, &args[1])?;
    let (h, s, l) = color.to_hsl();
    let delta = amount.value / 100.0 * direction;
    Ok(Value::Color(Color::from_hsl(h, s, l + delta, color.alpha)))
}

fn percentage(args: &[Value]) -> Result<Value, ValueError> {
    expect_arity("percentage", args, 1)?;
    let number = number_arg("percentage", &args[0])?;
    if !number.is_unitless() {
        return Err(ValueError::bad_argument(format!(
            "percentage() expects a unitless number, got {}{}",
            number.value, number.unit
        )));
    }
    Ok(Value::number(number.value * 100.0, "%"))
}

fn map_number(name: &str, args: &[Value], f: fn(f64) -> f64) -> Result<Value, ValueError> {
    expect_arity(name, args, 1)?;
    let number = number_arg(name, &args[0])?;
    Ok(Value::number(f(number.value), number.unit.clone()))
}

/// `min()`/`max()` over comparable numbers; otherwise left to CSS.
fn extremum(args: &[Value], better: fn(f64, f64) -> bool) -> Option<Result<Value, ValueError>> {
    let numbers: Vec<&Number> = args
        .iter()
        .map(|arg| match arg {
            Value::Number(number) => Some(number),
            _ => None,
        })
        .collect::<Option<_>>()?;
    let (first, rest) = numbers.split_first()?;
    let mut best = *first;
    for candidate in rest {
        let value = candidate.convert_to(&best.unit)?;
        if better(value, best.value) {
            best = candidate;
        }
    }
    Some(Ok(Value::Number(best.clone())))
}

fn unquote(args: &[Value]) -> Result<Value, ValueError> {
    expect_arity("unquote", args, 1)?;
    match &args[0] {
        Value::Str { text, .. } => Ok(Value::unquoted(text.clone())),
        other => Ok(other.clone()),
    }
}

fn quote(args: &[Value]) -> Result<Value, ValueError> {
    expect_arity("quote", args, 1)?;
    match &args[0] {
        Value::Str { text, quote } => Ok(Value::Str {
            text: text.clone(),
            quote: Some(quote.unwrap_or('"')),
        }),
        other => Err(ValueError::bad_argument(format!(
            "quote() expects a string, got {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalErrorKind;
    use crate::value::Format;

    fn css(value: &Value) -> String {
        value.to_css(&Format {
            precision: 5,
            compressed: false,
        })
    }

    fn run(name: &str, args: &[Value]) -> Value {
        call(name, args).expect("builtin").expect("call succeeds")
    }

    #[test]
    fn rgba_with_color_and_alpha() {
        let color = Value::Color(Color::from_hex("000").unwrap());
        let out = run("rgba", &[color, Value::number(0.5, "")]);
        assert_eq!(css(&out), "rgba(0, 0, 0, 0.5)");
    }

    #[test]
    fn rgb_from_channels() {
        let out = run(
            "rgb",
            &[Value::number(255.0, ""), Value::number(100.0, "%"), Value::number(0.0, "")],
        );
        assert_eq!(css(&out), "#ffff00");
    }

    #[test]
    fn rgb_with_css_variables_is_plain_css() {
        assert!(call("rgb", &[Value::unquoted("var(--r)")]).is_none());
    }

    #[test]
    fn lighten_and_darken() {
        let color = Value::Color(Color::from_hex("800000").unwrap());
        assert_eq!(css(&run("lighten", &[color.clone(), Value::number(20.0, "%")])), "#e60000");
        assert_eq!(css(&run("darken", &[color, Value::number(10.0, "%")])), "#4d0000");
    }

    #[test]
    fn percentage_and_rounding() {
        assert_eq!(css(&run("percentage", &[Value::number(0.25, "")])), "25%");
        assert_eq!(css(&run("round", &[Value::number(2.6, "px")])), "3px");
        assert_eq!(css(&run("floor", &[Value::number(2.6, "px")])), "2px");
        assert_eq!(css(&run("abs", &[Value::number(-4.0, "em")])), "4em");
    }

    #[test]
    fn min_max_compare_across_units() {
        let out = run("max", &[Value::number(1.0, "in"), Value::number(100.0, "px")]);
        assert_eq!(css(&out), "100px");
        assert!(call("min", &[Value::number(1.0, "px"), Value::number(1.0, "em")]).is_none());
    }

    #[test]
    fn wrong_arity_is_bad_argument() {
        let err = call("percentage", &[]).expect("builtin").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::BadArgument);
    }

    #[test]
    fn unknown_functions_are_not_builtins() {
        assert!(call("translate", &[Value::number(1.0, "px")]).is_none());
    }
}
