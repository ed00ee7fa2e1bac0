use anyhow::Result;

use crate::images::ImageStore;

pub fn run(store: &ImageStore, images: &[String]) -> Result<()> {
    for image in images {
        store.remove(image)?;
        println!("Removed {image}");
    }
    Ok(())
}
