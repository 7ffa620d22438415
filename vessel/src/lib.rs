//! # Vessel — scoped dependency resolution for Rust
//!
//! Declare capability types with [`dependency!`], assemble them into a
//! [`Context`], enter the context and resolve. See the
//! [`vessel_container`] crate for the engine itself.

pub use vessel_container::*;
pub use vessel_support::*;

#[cfg(test)]
mod tests {
    use super::*;

    struct Smoke;
    dependency!(Smoke = || Ok(Smoke));

    #[test]
    fn facade_re_exports_the_engine() {
        let context = Context::builder().register::<Smoke>().build().unwrap();
        let _guard = context.enter();
        assert!(resolve::<Smoke>().is_ok());
    }
}
