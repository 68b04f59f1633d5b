//! Tree command handler

use anyhow::{Context, Result};

use bookmirror_core::Mirror;

use crate::output::Output;

/// Fetch the structure and print the unified tree
///
/// With `root`, only the subtree under that node is printed.
pub async fn show(mirror: &Mirror, root: Option<String>, output: &Output) -> Result<()> {
    let tree = mirror
        .structure()
        .reload()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))
        .with_context(|| format!("Failed to load {} structure", mirror.structure().backend()))?;

    match root {
        Some(id) => {
            let node = tree
                .iter()
                .find_map(|n| n.find(&id))
                .with_context(|| format!("No folder or note with id '{}'", id))?;
            output.print_tree(std::slice::from_ref(node));
        }
        None => output.print_tree(&tree),
    }

    Ok(())
}
