use anyhow::{Context, Result, anyhow};
use evalexpr::{
    Context as _, ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, Value as EvalValue,
    build_operator_tree, eval_with_context,
};
use log::warn;

use crate::{
    extract::{ColumnsExtractor, Extraction},
    reader::RowPostProcessor,
    record::RecordType,
    value::normalize_column_name,
};

/// Post-processor keeping records for which every expression is truthy.
///
/// Identifiers are normalized column names (`First Name` becomes
/// `first_name`); overflow entries are bound the same way. Blank columns are
/// bound to the empty value.
pub struct ExpressionFilter<R> {
    expressions: Vec<String>,
    extraction: Extraction<R>,
}

impl<R: 'static> ExpressionFilter<R> {
    pub fn new<I, S>(record_type: &RecordType<R>, expressions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expressions = expressions
            .into_iter()
            .map(Into::into)
            .map(|expr: String| expr.trim().to_string())
            .collect::<Vec<_>>();
        if let Some(empty) = expressions.iter().position(String::is_empty) {
            return Err(anyhow!("Filter expression {} is empty", empty + 1));
        }
        for expr in &expressions {
            build_operator_tree::<DefaultNumericTypes>(expr)
                .with_context(|| format!("Parsing filter expression '{expr}'"))?;
        }
        let extraction = ColumnsExtractor::extract(record_type)?;
        Ok(Self {
            expressions,
            extraction,
        })
    }

    pub fn expressions(&self) -> &[String] {
        &self.expressions
    }

    fn build_context(&self, record: &R) -> Result<HashMapContext> {
        let mut context: HashMapContext = HashMapContext::new();
        for column in &self.extraction.columns {
            let accessor = self.extraction.fields.require(&column.field_name)?;
            let value = accessor
                .get(record)?
                .map(|value| value.to_evalexpr())
                .unwrap_or(EvalValue::Empty);
            context
                .set_value(normalize_column_name(&column.name), value)
                .with_context(|| format!("Binding column '{}'", column.name))?;
        }
        if let Some(overflow) = &self.extraction.overflow {
            let accessor = self.extraction.fields.require(&overflow.column.field_name)?;
            for (key, value) in accessor.map(record)?.into_iter().flatten() {
                let identifier = normalize_column_name(key);
                if context.get_value(&identifier).is_some() {
                    continue;
                }
                context
                    .set_value(identifier, value.to_evalexpr())
                    .with_context(|| format!("Binding overflow column '{key}'"))?;
            }
        }
        Ok(context)
    }

    pub fn evaluate(&self, record: &R) -> Result<bool> {
        let context = self.build_context(record)?;
        for expr in &self.expressions {
            let result = eval_with_context(expr, &context)
                .with_context(|| format!("Evaluating expression '{expr}'"))?;
            if !eval_value_truthy(result) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<R: 'static> RowPostProcessor<R> for ExpressionFilter<R> {
    fn process(&mut self, record: &R) -> bool {
        match self.evaluate(record) {
            Ok(keep) => keep,
            Err(err) => {
                warn!("Dropping record: {err:#}");
                false
            }
        }
    }
}

pub fn eval_value_truthy(value: EvalValue) -> bool {
    match value {
        EvalValue::Boolean(b) => b,
        EvalValue::Int(i) => i != 0,
        EvalValue::Float(f) => f != 0.0,
        EvalValue::String(s) => !s.is_empty(),
        EvalValue::Tuple(values) => values.into_iter().any(eval_value_truthy),
        EvalValue::Empty => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        record::{FieldTable, OverflowMap},
        schema::{ColumnSpec, OverflowSpec, RecordSchema},
        value::Value,
    };

    #[derive(Debug, Default)]
    struct Person {
        age: i32,
        name: Option<String>,
        extra: Option<OverflowMap>,
    }

    fn record_type() -> RecordType<Person> {
        let schema = RecordSchema::new()
            .column(ColumnSpec::new("age").named("Age"))
            .column(ColumnSpec::new("name").named("First Name"))
            .overflow(OverflowSpec::new("extra"));
        let fields = FieldTable::new()
            .field("age", |p: &Person| &p.age, |p: &mut Person| &mut p.age)
            .field("name", |p: &Person| &p.name, |p: &mut Person| &mut p.name)
            .overflow("extra", |p: &Person| &p.extra, |p: &mut Person| &mut p.extra);
        RecordType::new(schema, fields, Person::default)
    }

    fn person(age: i32, name: &str, city: &str) -> Person {
        let mut extra = OverflowMap::new();
        extra.insert("City".to_string(), Value::from(city));
        Person {
            age,
            name: Some(name.to_string()),
            extra: Some(extra),
        }
    }

    #[test]
    fn binds_normalized_column_names() {
        let filter = ExpressionFilter::new(&record_type(), ["age >= 30 && first_name == \"Ann\""])
            .unwrap();
        assert!(filter.evaluate(&person(31, "Ann", "Oslo")).unwrap());
        assert!(!filter.evaluate(&person(29, "Ann", "Oslo")).unwrap());
    }

    #[test]
    fn binds_overflow_entries() {
        let mut filter = ExpressionFilter::new(&record_type(), ["city == \"Berlin\""]).unwrap();
        assert!(filter.process(&person(40, "Bo", "Berlin")));
        assert!(!filter.process(&person(40, "Bo", "Paris")));
    }

    #[test]
    fn every_expression_must_hold() {
        let mut filter = ExpressionFilter::new(&record_type(), ["age > 18", "age < 65"]).unwrap();
        assert!(filter.process(&person(40, "Cy", "Rome")));
        assert!(!filter.process(&person(70, "Cy", "Rome")));
        assert_eq!(filter.expressions().len(), 2);
    }

    #[test]
    fn evaluation_errors_veto_the_record() {
        let mut filter = ExpressionFilter::new(&record_type(), ["unknown_column > 3"]).unwrap();
        assert!(!filter.process(&person(40, "Di", "Rome")));
    }

    #[test]
    fn invalid_expressions_are_rejected_up_front() {
        assert!(ExpressionFilter::new(&record_type(), ["(age > 3"]).is_err());
        assert!(ExpressionFilter::new(&record_type(), ["  "]).is_err());
    }
}
