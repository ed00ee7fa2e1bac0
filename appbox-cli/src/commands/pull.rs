use anyhow::Result;

use crate::images::ImageStore;

pub fn run(store: &ImageStore, image: &str) -> Result<()> {
    let path = store.download(image)?;
    println!("{}", path.display());
    Ok(())
}
