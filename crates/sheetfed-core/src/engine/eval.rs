use std::collections::{HashMap, HashSet};

use crate::cell::{CellId, CellRange, Grid};
use crate::model::Spreadsheet;

use super::parser::{BinaryOp, Expr, Function, Reference, parse_formula};
use super::{EngineError, ImportedValues};

#[derive(Clone, Debug, PartialEq)]
enum Value {
    Empty,
    Number(f64),
    Text(String),
}

impl Value {
    fn from_text(text: &str) -> Value {
        if text.is_empty() {
            Value::Empty
        } else {
            Value::Text(text.to_owned())
        }
    }

    fn render(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Number(n) => format_number(*n),
            Value::Text(text) => text.clone(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// 单张表格的一次求值过程：记忆化 + 在途集合做环检测。
pub(crate) struct Evaluation<'a> {
    sheet: &'a Spreadsheet,
    imported: &'a ImportedValues,
    done: HashMap<CellId, Value>,
    in_progress: HashSet<CellId>,
}

impl<'a> Evaluation<'a> {
    pub(crate) fn new(sheet: &'a Spreadsheet, imported: &'a ImportedValues) -> Self {
        Self {
            sheet,
            imported,
            done: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    pub(crate) fn grid(mut self) -> Result<Grid, EngineError> {
        let mut grid = Vec::with_capacity(self.sheet.rows);
        for row in 0..self.sheet.rows {
            let mut values = Vec::with_capacity(self.sheet.columns);
            for column in 0..self.sheet.columns {
                values.push(self.cell(CellId::new(row, column))?.render());
            }
            grid.push(values);
        }
        Ok(grid)
    }

    fn cell(&mut self, cell: CellId) -> Result<Value, EngineError> {
        if let Some(value) = self.done.get(&cell) {
            return Ok(value.clone());
        }
        if !self.in_progress.insert(cell) {
            return Err(EngineError::Cycle {
                cell: cell.to_string(),
            });
        }

        let raw = self.sheet.raw(cell);
        let value = match raw.strip_prefix('=') {
            Some(body) => {
                let expr = parse_formula(body).map_err(|detail| EngineError::Parse {
                    cell: cell.to_string(),
                    detail,
                })?;
                self.scalar(cell, &expr)?
            }
            None => Value::from_text(raw),
        };

        self.in_progress.remove(&cell);
        self.done.insert(cell, value.clone());
        Ok(value)
    }

    fn scalar(&mut self, at: CellId, expr: &Expr) -> Result<Value, EngineError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Ref(reference) => {
                let mut values = self.reference(at, reference)?;
                if values.len() != 1 {
                    return Err(EngineError::Parse {
                        cell: at.to_string(),
                        detail: "a range can only be used inside a function".to_owned(),
                    });
                }
                Ok(values.remove(0))
            }
            Expr::Neg(inner) => {
                let value = self.scalar(at, inner)?;
                Ok(Value::Number(-number(at, &value)?))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = number(at, &self.scalar(at, lhs)?)?;
                let rhs = number(at, &self.scalar(at, rhs)?)?;
                let value = match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div => {
                        if rhs == 0.0 {
                            return Err(EngineError::DivisionByZero {
                                cell: at.to_string(),
                            });
                        }
                        lhs / rhs
                    }
                };
                Ok(Value::Number(value))
            }
            Expr::Call(function, args) => {
                let mut numbers = Vec::new();
                for arg in args {
                    let values = match arg {
                        Expr::Ref(reference) => self.reference(at, reference)?,
                        other => vec![self.scalar(at, other)?],
                    };
                    for value in values {
                        if value != Value::Empty {
                            numbers.push(number(at, &value)?);
                        }
                    }
                }
                Ok(Value::Number(apply(*function, &numbers)))
            }
        }
    }

    fn reference(&mut self, at: CellId, reference: &Reference) -> Result<Vec<Value>, EngineError> {
        match reference {
            Reference::Local(range) => {
                self.check_bounds(at, range)?;
                range.cells().map(|cell| self.cell(cell)).collect()
            }
            Reference::Import(import) => {
                let grid = self
                    .imported
                    .get(import)
                    .ok_or_else(|| EngineError::MissingImport {
                        reference: import.to_string(),
                    })?;
                Ok(grid
                    .iter()
                    .flatten()
                    .map(|text| match text.parse::<f64>() {
                        Ok(n) => Value::Number(n),
                        Err(_) => Value::from_text(text),
                    })
                    .collect())
            }
        }
    }

    fn check_bounds(&self, at: CellId, range: &CellRange) -> Result<(), EngineError> {
        if range.bottom_right().fits(self.sheet.rows, self.sheet.columns) {
            Ok(())
        } else {
            Err(EngineError::OutOfBounds {
                cell: at.to_string(),
                reference: range.to_string(),
            })
        }
    }
}

fn number(at: CellId, value: &Value) -> Result<f64, EngineError> {
    match value {
        Value::Empty => Ok(0.0),
        Value::Number(n) => Ok(*n),
        Value::Text(text) => text.trim().parse().map_err(|_| EngineError::NotANumber {
            cell: at.to_string(),
            value: text.clone(),
        }),
    }
}

fn apply(function: Function, numbers: &[f64]) -> f64 {
    match function {
        Function::Sum => numbers.iter().sum(),
        Function::Avg if numbers.is_empty() => 0.0,
        Function::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
        Function::Min => numbers.iter().copied().reduce(f64::min).unwrap_or(0.0),
        Function::Max => numbers.iter().copied().reduce(f64::max).unwrap_or(0.0),
    }
}
