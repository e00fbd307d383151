//! Primitive wrapper classes (Character, Integer, Long, Double, Float,
//! Boolean, Byte, Short, Number) and Math.

use crate::stdlib::{
    ClassFamily, NativeCall, NativeCtx, NativeRegistry, NativeResult, arg_f64, arg_i64,
    arg_string, arg_value,
};
use crate::vm::Value;
use rand::Rng;

pub(super) fn do_register_wrapper_natives(registry: &mut NativeRegistry) {
    for family in [
        ClassFamily::Integer,
        ClassFamily::Long,
        ClassFamily::Byte,
        ClassFamily::Short,
    ] {
        registry.register_all(
            family,
            &["parseInt", "parseLong", "parseByte", "parseShort"],
            wrapper_parse_integral,
        );
        registry.register(family, "valueOf", wrapper_integral_value_of);
        registry.register(family, "toString", wrapper_to_string);
        registry.register(family, "compareTo", wrapper_compare_to);
        registry.register(family, "max", wrapper_max);
        registry.register(family, "min", wrapper_min);
        registry.register_all(
            family,
            &["intValue", "longValue", "byteValue", "shortValue"],
            wrapper_int_value,
        );
        registry.register_all(family, &["doubleValue", "floatValue"], wrapper_double_value);
    }

    for family in [ClassFamily::Double, ClassFamily::Float] {
        registry.register_all(
            family,
            &["parseDouble", "parseFloat"],
            wrapper_parse_floating,
        );
        registry.register(family, "valueOf", wrapper_floating_value_of);
        registry.register(family, "toString", wrapper_to_string);
        registry.register(family, "compareTo", wrapper_compare_to);
        registry.register(family, "max", wrapper_max);
        registry.register(family, "min", wrapper_min);
        registry.register_all(family, &["intValue", "longValue"], wrapper_int_value);
        registry.register_all(family, &["doubleValue", "floatValue"], wrapper_double_value);
        registry.register(family, "isNaN", double_is_nan);
    }

    let number = ClassFamily::Number;
    registry.register_all(number, &["intValue", "longValue"], wrapper_int_value);
    registry.register_all(number, &["doubleValue", "floatValue"], wrapper_double_value);
    registry.register(number, "toString", wrapper_to_string);
    registry.register(number, "compareTo", wrapper_compare_to);

    let b = ClassFamily::Boolean;
    registry.register(b, "parseBoolean", boolean_parse);
    registry.register(b, "valueOf", boolean_parse);
    registry.register(b, "toString", wrapper_to_string);
    registry.register(b, "booleanValue", boolean_value);

    let c = ClassFamily::Character;
    registry.register(c, "isDigit", char_is_digit);
    registry.register(c, "isLetter", char_is_letter);
    registry.register(c, "isLetterOrDigit", char_is_letter_or_digit);
    registry.register(c, "isWhitespace", char_is_whitespace);
    registry.register(c, "isUpperCase", char_is_upper);
    registry.register(c, "isLowerCase", char_is_lower);
    registry.register(c, "toUpperCase", char_to_upper);
    registry.register(c, "toLowerCase", char_to_lower);
    registry.register(c, "getNumericValue", char_numeric_value);
    registry.register_all(c, &["valueOf", "charValue"], char_value_of);
    registry.register(c, "toString", wrapper_to_string);
    registry.register(c, "compareTo", wrapper_compare_to);

    let m = ClassFamily::Math;
    registry.register(m, "abs", math_abs);
    registry.register(m, "max", wrapper_max);
    registry.register(m, "min", wrapper_min);
    registry.register(m, "sqrt", math_sqrt);
    registry.register(m, "pow", math_pow);
    registry.register(m, "floor", math_floor);
    registry.register(m, "ceil", math_ceil);
    registry.register(m, "round", math_round);
    registry.register(m, "random", math_random);
    registry.register(m, "log", math_log);
    registry.register(m, "sin", math_sin);
    registry.register(m, "cos", math_cos);
    registry.register(m, "PI", math_pi);
}

/// Receiver for instance forms, first argument for static forms.
fn subject(call: &NativeCall) -> Value {
    match &call.receiver {
        Some(receiver) => receiver.clone(),
        None => arg_value(call, 0),
    }
}

fn wrapper_parse_integral(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let text = arg_string(ctx, call, 0);
    // invalid input soft-fails to zero, like the other arithmetic edges
    Ok(Some(Value::Int(text.trim().parse().unwrap_or(0))))
}

fn wrapper_parse_floating(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let text = arg_string(ctx, call, 0);
    Ok(Some(Value::Double(text.trim().parse().unwrap_or(0.0))))
}

fn wrapper_integral_value_of(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let value = arg_value(call, 0);
    match ctx.string_of(&value) {
        Some(text) => Ok(Some(Value::Int(text.trim().parse().unwrap_or(0)))),
        None => Ok(Some(Value::Int(value.as_i64().unwrap_or(0)))),
    }
}

fn wrapper_floating_value_of(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let value = arg_value(call, 0);
    match ctx.string_of(&value) {
        Some(text) => Ok(Some(Value::Double(text.trim().parse().unwrap_or(0.0)))),
        None => Ok(Some(Value::Double(value.as_f64().unwrap_or(0.0)))),
    }
}

fn wrapper_to_string(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let value = subject(call);
    Ok(Some(Value::Str(ctx.display(&value))))
}

fn wrapper_compare_to(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let receiver = subject(call);
    let other = if call.receiver.is_some() {
        arg_value(call, 0)
    } else {
        arg_value(call, 1)
    };
    let (a, b) = (
        receiver.as_f64().unwrap_or(0.0),
        other.as_f64().unwrap_or(0.0),
    );
    let ordering = if a < b {
        -1
    } else if a > b {
        1
    } else {
        0
    };
    Ok(Some(Value::Int(ordering)))
}

fn wrapper_int_value(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Int(subject(call).as_i64().unwrap_or(0))))
}

fn wrapper_double_value(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(subject(call).as_f64().unwrap_or(0.0))))
}

fn double_is_nan(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(subject(call).as_f64().is_some_and(f64::is_nan))))
}

fn boolean_parse(ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let value = arg_value(call, 0);
    let parsed = match ctx.string_of(&value) {
        Some(text) => text.eq_ignore_ascii_case("true"),
        None => value.is_truthy(),
    };
    Ok(Some(Value::Bool(parsed)))
}

fn boolean_value(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(subject(call).is_truthy())))
}

fn char_arg(call: &NativeCall) -> char {
    match subject(call) {
        Value::Char(c) => c,
        other => other
            .as_i64()
            .and_then(|n| u32::try_from(n).ok())
            .and_then(char::from_u32)
            .unwrap_or('\0'),
    }
}

fn char_is_digit(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(char_arg(call).is_ascii_digit())))
}

fn char_is_letter(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(char_arg(call).is_alphabetic())))
}

fn char_is_letter_or_digit(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let c = char_arg(call);
    Ok(Some(Value::Bool(c.is_alphabetic() || c.is_ascii_digit())))
}

fn char_is_whitespace(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(char_arg(call).is_whitespace())))
}

fn char_is_upper(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(char_arg(call).is_uppercase())))
}

fn char_is_lower(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Bool(char_arg(call).is_lowercase())))
}

fn char_to_upper(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let c = char_arg(call).to_uppercase().next().unwrap_or('\0');
    Ok(Some(Value::Char(c)))
}

fn char_to_lower(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let c = char_arg(call).to_lowercase().next().unwrap_or('\0');
    Ok(Some(Value::Char(c)))
}

fn char_numeric_value(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let c = char_arg(call);
    let value = c.to_digit(36).map(|d| d as i64).unwrap_or(-1);
    Ok(Some(Value::Int(value)))
}

fn char_value_of(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Char(char_arg(call))))
}

// ---- Math ----

fn both_integral(call: &NativeCall) -> bool {
    call.args.iter().all(|a| !a.is_floating())
}

fn math_abs(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let value = arg_value(call, 0);
    let result = match value {
        Value::Int(n) | Value::Long(n) => Value::Int(n.wrapping_abs()),
        other => Value::Double(other.as_f64().unwrap_or(0.0).abs()),
    };
    Ok(Some(result))
}

fn wrapper_max(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let result = if both_integral(call) {
        Value::Int(arg_i64(call, 0).max(arg_i64(call, 1)))
    } else {
        Value::Double(arg_f64(call, 0).max(arg_f64(call, 1)))
    };
    Ok(Some(result))
}

fn wrapper_min(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    let result = if both_integral(call) {
        Value::Int(arg_i64(call, 0).min(arg_i64(call, 1)))
    } else {
        Value::Double(arg_f64(call, 0).min(arg_f64(call, 1)))
    };
    Ok(Some(result))
}

fn math_sqrt(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(arg_f64(call, 0).sqrt())))
}

fn math_pow(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(arg_f64(call, 0).powf(arg_f64(call, 1)))))
}

fn math_floor(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(arg_f64(call, 0).floor())))
}

fn math_ceil(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(arg_f64(call, 0).ceil())))
}

fn math_round(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Int(arg_f64(call, 0).round() as i64)))
}

fn math_random(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(rand::thread_rng().r#gen::<f64>())))
}

fn math_log(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(arg_f64(call, 0).ln())))
}

fn math_sin(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(arg_f64(call, 0).sin())))
}

fn math_cos(_ctx: &mut NativeCtx<'_>, call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(arg_f64(call, 0).cos())))
}

/// `Math.PI()` written as a call; the GETSTATIC path covers `Math.PI`.
fn math_pi(_ctx: &mut NativeCtx<'_>, _call: &NativeCall) -> NativeResult {
    Ok(Some(Value::Double(std::f64::consts::PI)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::simulator::SimulatorConfig;
    use crate::vm::VmState;

    fn call_static(class: &str, method: &str, args: Vec<Value>) -> NativeCall {
        NativeCall {
            class: class.to_string(),
            method: method.to_string(),
            receiver: None,
            args,
        }
    }

    fn run(call: &NativeCall) -> Option<Value> {
        let mut state = VmState::new();
        let config = SimulatorConfig::default();
        let mut ctx = NativeCtx {
            state: &mut state,
            config: &config,
        };
        let family = crate::stdlib::classify(&call.class, ctx.state).unwrap();
        let handler = super::super::REGISTRY.lookup(family, &call.method).unwrap();
        handler(&mut ctx, call).unwrap()
    }

    #[test]
    fn parse_int_trims_and_soft_fails() {
        let ok = call_static("Integer", "parseInt", vec![Value::Str(" 42 ".into())]);
        assert_eq!(run(&ok), Some(Value::Int(42)));
        let bad = call_static("Integer", "parseInt", vec![Value::Str("abc".into())]);
        assert_eq!(run(&bad), Some(Value::Int(0)));
    }

    #[test]
    fn math_preserves_integralness() {
        let ints = call_static("Math", "max", vec![Value::Int(3), Value::Int(9)]);
        assert_eq!(run(&ints), Some(Value::Int(9)));
        let mixed = call_static("Math", "min", vec![Value::Int(3), Value::Double(2.5)]);
        assert_eq!(run(&mixed), Some(Value::Double(2.5)));
        let abs = call_static("Math", "abs", vec![Value::Int(-7)]);
        assert_eq!(run(&abs), Some(Value::Int(7)));
    }

    #[test]
    fn character_predicates() {
        let digit = call_static("Character", "isDigit", vec![Value::Char('7')]);
        assert_eq!(run(&digit), Some(Value::Bool(true)));
        let upper = call_static("Character", "toUpperCase", vec![Value::Char('q')]);
        assert_eq!(run(&upper), Some(Value::Char('Q')));
    }

    #[test]
    fn math_random_is_unit_interval() {
        for _ in 0..32 {
            let call = call_static("Math", "random", vec![]);
            match run(&call) {
                Some(Value::Double(x)) => assert!((0.0..1.0).contains(&x)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
