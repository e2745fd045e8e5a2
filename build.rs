use vergen_gitcl::{Build, Cargo, Emitter, Gitcl};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = Build::builder().build_timestamp(true).build();
    let cargo = Cargo::builder().build();
    let gitcl = Gitcl::builder().branch(true).sha(true).dirty(true).build();

    // Source tarballs have no .git; fall back to build + cargo metadata only.
    let with_git = Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&cargo)?
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = with_git {
        println!("cargo:warning=git metadata unavailable: {e}");
        Emitter::default()
            .add_instructions(&build)?
            .add_instructions(&cargo)?
            .emit()?;
    }

    Ok(())
}
