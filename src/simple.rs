//! Raw row access without a record schema.

use log::debug;

use crate::{
    error::Result,
    reader::{RowPostProcessor, is_blank_row, read_cell_value},
    sheet::Sheet,
    value::Value,
    writer::write_to_cell,
};

/// One row of raw values by position; `None` is a blank cell.
pub type RawRow = Vec<Option<Value>>;

/// Reads every non-blank row as raw cell values.
pub struct SimpleSheetReader<'s, S: Sheet + ?Sized> {
    sheet: &'s S,
    skip_header: bool,
    post_processors: Vec<Box<dyn RowPostProcessor<RawRow> + 's>>,
}

impl<'s, S: Sheet + ?Sized> SimpleSheetReader<'s, S> {
    pub fn new(sheet: &'s S) -> Self {
        Self {
            sheet,
            skip_header: false,
            post_processors: Vec::new(),
        }
    }

    pub fn skip_header_row(&mut self, skip: bool) -> &mut Self {
        self.skip_header = skip;
        self
    }

    pub fn add_post_processor<P>(&mut self, processor: P)
    where
        P: RowPostProcessor<RawRow> + 's,
    {
        self.post_processors.push(Box::new(processor));
    }

    pub fn read(&mut self) -> Result<Vec<RawRow>> {
        let first = usize::from(self.skip_header);
        let mut rows = Vec::new();
        for row in first..self.sheet.row_count() {
            if is_blank_row(self.sheet, row) {
                continue;
            }
            let values = (0..self.sheet.row_width(row))
                .map(|column| read_cell_value(self.sheet.cell(row, column), None))
                .collect::<RawRow>();
            if self
                .post_processors
                .iter_mut()
                .all(|processor| processor.process(&values))
            {
                rows.push(values);
            }
        }
        debug!("Read {} raw row(s)", rows.len());
        Ok(rows)
    }
}

/// Writes raw rows, typing each cell from its value.
pub struct SimpleSheetWriter<'s, S: Sheet + ?Sized> {
    sheet: &'s mut S,
}

impl<'s, S: Sheet + ?Sized> SimpleSheetWriter<'s, S> {
    pub fn new(sheet: &'s mut S) -> Self {
        Self { sheet }
    }

    pub fn write(&mut self, rows: &[RawRow]) -> Result<()> {
        for (row, values) in rows.iter().enumerate() {
            for (column, value) in values.iter().enumerate() {
                match value {
                    Some(value) => {
                        let cell = write_to_cell(value, value.value_type(), None)?;
                        self.sheet.set_cell(row, column, cell);
                    }
                    None => self.sheet.clear_cell(row, column),
                }
            }
        }
        debug!("Wrote {} raw row(s)", rows.len());
        Ok(())
    }
}
