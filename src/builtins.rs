//! The standard function and aggregator set installed by
//! `Registries::with_builtins`.

use std::any::Any;
use std::sync::Arc;

use crate::error::{Result, SqlError};
use crate::registry::{
    AggregateState, ExternalAggregator, ExternalDatasetFunction, ExternalFunction, Registries,
};
use crate::value::{ExpressionValue, Value};

/// Install the builtins, returning the registration handles the
/// caller must keep alive.
pub fn install(registries: &Arc<Registries>) -> Result<Vec<Box<dyn Any + Send>>> {
    let mut handles: Vec<Box<dyn Any + Send>> = Vec::new();

    let functions = &registries.functions;
    handles.push(Box::new(functions.register("at", at_function())?));
    handles.push(Box::new(
        functions.register("to_timestamp", to_timestamp_function())?,
    ));
    handles.push(Box::new(functions.register("lower", string_function("lower", str::to_lowercase))?));
    handles.push(Box::new(functions.register("upper", string_function("upper", str::to_uppercase))?));
    handles.push(Box::new(functions.register("abs", abs_function())?));
    handles.push(Box::new(functions.register("sqrt", sqrt_function())?));

    let aggregators = &registries.aggregators;
    handles.push(Box::new(aggregators.register("count", count_aggregator())?));
    handles.push(Box::new(
        aggregators.register("vertical_count", count_aggregator())?,
    ));
    handles.push(Box::new(aggregators.register("sum", sum_aggregator())?));
    handles.push(Box::new(aggregators.register("avg", avg_aggregator())?));
    handles.push(Box::new(aggregators.register("min", extreme_aggregator(false))?));
    handles.push(Box::new(aggregators.register("max", extreme_aggregator(true))?));

    handles.push(Box::new(
        registries
            .dataset_functions
            .register("row_dataset", row_dataset_function())?,
    ));

    Ok(handles)
}

fn expect_arity(name: &'static str, args: &[ExpressionValue], arity: usize) -> Result<()> {
    if args.len() != arity {
        return Err(SqlError::evaluation(format!(
            "function {} expects {} argument{}, got {}",
            name,
            arity,
            if arity == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

/// `at(value, ts)` re-timestamps a value.
fn at_function() -> ExternalFunction {
    ExternalFunction::new(|args, _scope| {
        expect_arity("at", args, 2)?;
        let ts = match args[1].value.cast_to("timestamp")? {
            Value::Timestamp(ts) => ts,
            Value::Null => return Ok(ExpressionValue::null()),
            other => {
                return Err(SqlError::evaluation(format!(
                    "at() requires a timestamp, got {}",
                    other.type_name()
                )))
            }
        };
        Ok(ExpressionValue::new(args[0].value.clone(), ts))
    })
}

fn to_timestamp_function() -> ExternalFunction {
    ExternalFunction::new(|args, _scope| {
        expect_arity("to_timestamp", args, 1)?;
        Ok(ExpressionValue::new(
            args[0].value.cast_to("timestamp")?,
            args[0].timestamp,
        ))
    })
}

fn string_function(name: &'static str, apply: fn(&str) -> String) -> ExternalFunction {
    ExternalFunction::new(move |args, _scope| {
        expect_arity(name, args, 1)?;
        let out = match &args[0].value {
            Value::Null => Value::Null,
            Value::String(s) => Value::String(apply(s)),
            other => {
                return Err(SqlError::evaluation(format!(
                    "{}() requires a string, got {}",
                    name,
                    other.type_name()
                )))
            }
        };
        Ok(ExpressionValue::new(out, args[0].timestamp))
    })
}

fn abs_function() -> ExternalFunction {
    ExternalFunction::new(|args, _scope| {
        expect_arity("abs", args, 1)?;
        let out = match &args[0].value {
            Value::Null => Value::Null,
            Value::Int(i) => Value::Int(i.checked_abs().ok_or_else(|| {
                SqlError::evaluation("integer overflow in abs()")
            })?),
            Value::Float(f) => Value::Float(f.abs()),
            other => {
                return Err(SqlError::evaluation(format!(
                    "abs() requires a number, got {}",
                    other.type_name()
                )))
            }
        };
        Ok(ExpressionValue::new(out, args[0].timestamp))
    })
}

fn sqrt_function() -> ExternalFunction {
    ExternalFunction::new(|args, _scope| {
        expect_arity("sqrt", args, 1)?;
        let out = match &args[0].value {
            Value::Null => Value::Null,
            other => {
                let f = other.as_f64().ok_or_else(|| {
                    SqlError::evaluation(format!(
                        "sqrt() requires a number, got {}",
                        other.type_name()
                    ))
                })?;
                Value::Float(f.sqrt())
            }
        };
        Ok(ExpressionValue::new(out, args[0].timestamp))
    })
}

/// `row_dataset({...})` exposes a row literal as a one-row table.
fn row_dataset_function() -> ExternalDatasetFunction {
    ExternalDatasetFunction {
        call: Arc::new(|args| {
            if args.len() != 1 {
                return Err(SqlError::evaluation(format!(
                    "row_dataset expects 1 argument, got {}",
                    args.len()
                )));
            }
            match &args[0].value {
                Value::Row(_) => Ok(args[0].clone()),
                other => Err(SqlError::evaluation(format!(
                    "row_dataset requires a row, got {}",
                    other.type_name()
                ))),
            }
        }),
    }
}

fn downcast_state<'a, T: 'static>(state: &'a mut AggregateState) -> Result<&'a mut T> {
    state
        .downcast_mut::<T>()
        .ok_or_else(|| SqlError::evaluation("aggregate state has the wrong type"))
}

fn take_state<T: 'static>(state: AggregateState) -> Result<T> {
    state
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| SqlError::evaluation("aggregate state has the wrong type"))
}

/// Counts non-null inputs.
fn count_aggregator() -> ExternalAggregator {
    ExternalAggregator {
        init: Box::new(|| Box::new(0i64)),
        process: Box::new(|state, args| {
            let n = downcast_state::<i64>(state)?;
            if args.first().map_or(false, |a| !a.is_null()) {
                *n += 1;
            }
            Ok(())
        }),
        extract: Box::new(|state| {
            let n = take_state::<i64>(state)?;
            Ok(ExpressionValue::constant(Value::Int(n)))
        }),
    }
}

#[derive(Default)]
struct SumState {
    total: f64,
    all_int: bool,
    any: bool,
}

fn sum_aggregator() -> ExternalAggregator {
    ExternalAggregator {
        init: Box::new(|| {
            Box::new(SumState {
                all_int: true,
                ..SumState::default()
            })
        }),
        process: Box::new(|state, args| {
            let s = downcast_state::<SumState>(state)?;
            if let Some(arg) = args.first() {
                if arg.is_null() {
                    return Ok(());
                }
                let f = arg.value.as_f64().ok_or_else(|| {
                    SqlError::evaluation(format!(
                        "sum() requires numbers, got {}",
                        arg.value.type_name()
                    ))
                })?;
                s.total += f;
                s.all_int &= arg.value.is_integer() || matches!(arg.value, Value::Bool(_));
                s.any = true;
            }
            Ok(())
        }),
        extract: Box::new(|state| {
            let s = take_state::<SumState>(state)?;
            let out = if !s.any {
                Value::Null
            } else if s.all_int {
                Value::Int(s.total as i64)
            } else {
                Value::Float(s.total)
            };
            Ok(ExpressionValue::constant(out))
        }),
    }
}

#[derive(Default)]
struct AvgState {
    total: f64,
    count: u64,
}

fn avg_aggregator() -> ExternalAggregator {
    ExternalAggregator {
        init: Box::new(|| Box::new(AvgState::default())),
        process: Box::new(|state, args| {
            let s = downcast_state::<AvgState>(state)?;
            if let Some(arg) = args.first() {
                if arg.is_null() {
                    return Ok(());
                }
                let f = arg.value.as_f64().ok_or_else(|| {
                    SqlError::evaluation(format!(
                        "avg() requires numbers, got {}",
                        arg.value.type_name()
                    ))
                })?;
                s.total += f;
                s.count += 1;
            }
            Ok(())
        }),
        extract: Box::new(|state| {
            let s = take_state::<AvgState>(state)?;
            let out = if s.count == 0 {
                Value::Null
            } else {
                Value::Float(s.total / s.count as f64)
            };
            Ok(ExpressionValue::constant(out))
        }),
    }
}

/// min/max, keeping the winning value's timestamp.
fn extreme_aggregator(want_greater: bool) -> ExternalAggregator {
    ExternalAggregator {
        init: Box::new(|| Box::new(None::<ExpressionValue>)),
        process: Box::new(move |state, args| {
            let best = downcast_state::<Option<ExpressionValue>>(state)?;
            if let Some(arg) = args.first() {
                if arg.is_null() {
                    return Ok(());
                }
                let replace = match best {
                    None => true,
                    Some(current) => {
                        let ord = arg.value.compare(&current.value);
                        if want_greater {
                            ord == std::cmp::Ordering::Greater
                        } else {
                            ord == std::cmp::Ordering::Less
                        }
                    }
                };
                if replace {
                    *best = Some(arg.clone());
                }
            }
            Ok(())
        }),
        extract: Box::new(|state| {
            let best = take_state::<Option<ExpressionValue>>(state)?;
            Ok(best.unwrap_or_else(ExpressionValue::null))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::scope::EmptyRowScope;
    use crate::value::negative_infinity;

    fn call(f: &ExternalFunction, args: &[ExpressionValue]) -> Result<ExpressionValue> {
        (f.call)(args, &EmptyRowScope)
    }

    #[test]
    fn test_string_functions() {
        let lower = string_function("lower", str::to_lowercase);
        let out = call(&lower, &[ExpressionValue::constant(Value::String("AbC".into()))]).unwrap();
        assert_eq!(out.value, Value::String("abc".to_string()));

        let out = call(&lower, &[ExpressionValue::null()]).unwrap();
        assert_eq!(out.value, Value::Null);

        assert!(call(&lower, &[ExpressionValue::constant(Value::Int(3))]).is_err());
        assert!(call(&lower, &[]).is_err());
    }

    #[test]
    fn test_at_retimestamps() {
        let ts = "2024-06-01T00:00:00Z".parse().unwrap();
        let out = call(
            &at_function(),
            &[
                ExpressionValue::constant(Value::Int(5)),
                ExpressionValue::constant(Value::Timestamp(ts)),
            ],
        )
        .unwrap();
        assert_eq!(out.value, Value::Int(5));
        assert_eq!(out.timestamp, ts);
    }

    #[test]
    fn test_sum_int_stays_int() {
        let agg = sum_aggregator();
        let mut state = (agg.init)();
        for i in [1i64, 2, 3] {
            (agg.process)(&mut state, &[ExpressionValue::constant(Value::Int(i))]).unwrap();
        }
        (agg.process)(&mut state, &[ExpressionValue::null()]).unwrap();
        let out = (agg.extract)(state).unwrap();
        assert_eq!(out.value, Value::Int(6));
    }

    #[test]
    fn test_sum_mixed_goes_float() {
        let agg = sum_aggregator();
        let mut state = (agg.init)();
        (agg.process)(&mut state, &[ExpressionValue::constant(Value::Int(1))]).unwrap();
        (agg.process)(&mut state, &[ExpressionValue::constant(Value::Float(0.5))]).unwrap();
        let out = (agg.extract)(state).unwrap();
        assert_eq!(out.value, Value::Float(1.5));
    }

    #[test]
    fn test_empty_aggregates() {
        let sum = sum_aggregator();
        let out = (sum.extract)((sum.init)()).unwrap();
        assert_eq!(out.value, Value::Null);

        let count = count_aggregator();
        let out = (count.extract)((count.init)()).unwrap();
        assert_eq!(out.value, Value::Int(0));

        let avg = avg_aggregator();
        let out = (avg.extract)((avg.init)()).unwrap();
        assert_eq!(out.value, Value::Null);
    }

    #[test]
    fn test_max_keeps_winning_timestamp() {
        let ts1 = "2020-01-01T00:00:00Z".parse().unwrap();
        let ts2 = "2021-01-01T00:00:00Z".parse().unwrap();
        let agg = extreme_aggregator(true);
        let mut state = (agg.init)();
        (agg.process)(&mut state, &[ExpressionValue::new(Value::Int(9), ts1)]).unwrap();
        (agg.process)(&mut state, &[ExpressionValue::new(Value::Int(4), ts2)]).unwrap();
        let out = (agg.extract)(state).unwrap();
        assert_eq!(out.value, Value::Int(9));
        assert_eq!(out.timestamp, ts1);
    }

    #[test]
    fn test_count_counts_non_null() {
        let agg = count_aggregator();
        let mut state = (agg.init)();
        (agg.process)(&mut state, &[ExpressionValue::constant(Value::Int(1))]).unwrap();
        (agg.process)(&mut state, &[ExpressionValue::null()]).unwrap();
        (agg.process)(&mut state, &[ExpressionValue::constant(Value::Bool(true))]).unwrap();
        let out = (agg.extract)(state).unwrap();
        assert_eq!(out.value, Value::Int(2));
        assert_eq!(out.timestamp, negative_infinity());
    }
}
