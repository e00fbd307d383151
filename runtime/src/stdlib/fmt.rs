//! `String.format` emulation. Recognises the conversions
//! %d %i %o %u %x %X %e %f %g %s %c %b %n with optional width and
//! precision; anything else is copied through verbatim.

use crate::heap::Heap;
use crate::vm::{Value, value_to_string};

struct Spec {
    left_align: bool,
    zero_pad: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

fn pad(spec: &Spec, text: String) -> String {
    if text.len() >= spec.width {
        return text;
    }
    let fill = spec.width - text.len();
    if spec.left_align {
        format!("{}{}", text, " ".repeat(fill))
    } else if spec.zero_pad {
        let (sign, rest) = match text.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", text.as_str()),
        };
        format!("{}{}{}", sign, "0".repeat(fill), rest)
    } else {
        format!("{}{}", " ".repeat(fill), text)
    }
}

fn convert(heap: &Heap, spec: &Spec, value: Option<&Value>) -> String {
    let value = value.cloned().unwrap_or(Value::Null);
    let text = match spec.conversion {
        'd' | 'i' => value.as_i64().unwrap_or(0).to_string(),
        'o' => format!("{:o}", value.as_i64().unwrap_or(0)),
        'u' => (value.as_i64().unwrap_or(0).unsigned_abs()).to_string(),
        'x' => format!("{:x}", value.as_i64().unwrap_or(0)),
        'X' => format!("{:X}", value.as_i64().unwrap_or(0)),
        'e' => format!(
            "{:.*e}",
            spec.precision.unwrap_or(6),
            value.as_f64().unwrap_or(0.0)
        ),
        'f' => format!(
            "{:.*}",
            spec.precision.unwrap_or(6),
            value.as_f64().unwrap_or(0.0)
        ),
        'g' => format!("{}", value.as_f64().unwrap_or(0.0)),
        's' => {
            let mut s = value_to_string(heap, &value);
            if let Some(precision) = spec.precision {
                s.truncate(precision);
            }
            s
        }
        'c' => match value {
            Value::Char(c) => c.to_string(),
            other => other
                .as_i64()
                .and_then(|n| u32::try_from(n).ok())
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_default(),
        },
        'b' => value.is_truthy().to_string(),
        other => other.to_string(),
    };
    pad(spec, text)
}

pub fn java_format(heap: &Heap, format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
                continue;
            }
            Some('n') => {
                chars.next();
                out.push('\n');
                continue;
            }
            None => {
                out.push('%');
                continue;
            }
            _ => {}
        }

        let mut spec = Spec {
            left_align: false,
            zero_pad: false,
            width: 0,
            precision: None,
            conversion: 's',
        };
        if chars.peek() == Some(&'-') {
            spec.left_align = true;
            chars.next();
        }
        if chars.peek() == Some(&'0') {
            spec.zero_pad = true;
            chars.next();
        }
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            spec.width = spec.width * 10 + d as usize;
            chars.next();
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                precision = precision * 10 + d as usize;
                chars.next();
            }
            spec.precision = Some(precision);
        }
        match chars.next() {
            Some(conversion) if "dioxXeufgscb".contains(conversion) => {
                spec.conversion = conversion;
                out.push_str(&convert(heap, &spec, args.get(next_arg)));
                next_arg += 1;
            }
            Some(other) => {
                // unknown conversion: emit it verbatim
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("%d apples", &[Value::Int(3)], "3 apples")]
    #[case("%5d|", &[Value::Int(42)], "   42|")]
    #[case("%-5d|", &[Value::Int(42)], "42   |")]
    #[case("%05d", &[Value::Int(-42)], "-0042")]
    #[case("%x %X", &[Value::Int(255), Value::Int(255)], "ff FF")]
    #[case("%.2f", &[Value::Double(3.14159)], "3.14")]
    #[case("%s=%b", &[Value::Str("on".into()), Value::Bool(true)], "on=true")]
    #[case("%c", &[Value::Char('q')], "q")]
    #[case("100%%", &[], "100%")]
    #[case("a%nb", &[], "a\nb")]
    #[case("%d %d", &[Value::Int(1)], "1 0")]
    fn formats(#[case] format: &str, #[case] args: &[Value], #[case] expected: &str) {
        let heap = Heap::new();
        assert_eq!(java_format(&heap, format, args), expected);
    }
}
