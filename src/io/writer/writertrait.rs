use crate::error::Error;
use crate::item::Item;

/// Item-by-item output.
pub trait ItemWriter {
    fn write_item(&mut self, item: &Item) -> Result<(), Error>;
    fn flush(&mut self) -> Result<(), Error>;
}

/// Write every item, stopping at the first error. Returns the number of written items.
pub fn write_items<W, I>(writer: &mut W, items: I) -> Result<usize, Error>
where
    W: ItemWriter + ?Sized,
    I: IntoIterator<Item = Result<Item, Error>>,
{
    let mut nb = 0;
    for item in items {
        writer.write_item(&item?)?;
        nb += 1;
    }
    writer.flush()?;
    Ok(nb)
}
