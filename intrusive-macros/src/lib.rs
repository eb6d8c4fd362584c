extern crate proc_macro;
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, LitInt};

/// Marks a concurrency test.
///
/// Normally the body simply runs once as a `#[test]`. When the crate under
/// test is built with its `shuttle` feature, the body is instead handed to
/// `shuttle::check_random`, which explores many thread interleavings. The
/// body must spawn threads through a module that switches to
/// `shuttle::thread` under that feature.
///
/// ```ignore
/// #[stress_test]
/// fn test_clones() { ... }
///
/// #[stress_test(iterations = 5000)]
/// fn test_more_clones() { ... }
/// ```
#[proc_macro_attribute]
pub fn stress_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut iterations: Option<LitInt> = None;
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("iterations") {
            iterations = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported stress_test argument, expected `iterations = N`"))
        }
    });
    parse_macro_input!(attr with parser);

    let input_fn = parse_macro_input!(item as ItemFn);
    let fn_block = &input_fn.block;
    let fn_attrs = &input_fn.attrs;
    let fn_sig = &input_fn.sig;
    let iterations = match iterations {
        Some(lit) => quote! { #lit },
        None => quote! { 1000 },
    };

    let expanded = quote! {
        #(#fn_attrs)*
        #[test]
        #fn_sig
        {
            let body = || #fn_block;
            #[cfg(feature = "shuttle")]
            ::shuttle::check_random(body, #iterations);
            #[cfg(not(feature = "shuttle"))]
            body();
        }
    };

    TokenStream::from(expanded)
}
