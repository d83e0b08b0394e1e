use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, punctuated::Punctuated, spanned::Spanned, FnArg, Ident, ItemFn, Pat,
    Signature, Token, Type,
};

/// Transform an asynchronous test into a synchronous one running against a
/// freshly deployed voting system on an in-memory ledger, and inject
/// dependencies.
///
/// Injectable dependencies are `Client` (a Rocket local client over the
/// system), `System` (the voting system facade), `TestLedger` (the simulated
/// ledger) and `Seeded` (the seeded parties, candidates, voters and election).
///
/// Options:
/// - `running`: start the seeded election and move into its voting period.
/// - `strict`: the client's relay uses the strict failure policy.
#[proc_macro_attribute]
pub fn ledger_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    let options = parse_macro_input!(args with Punctuated::<Ident, Token![,]>::parse_terminated);

    let mut running = false;
    let mut strict = false;
    for option in &options {
        if option == "running" {
            running = true;
        } else if option == "strict" {
            strict = true;
        } else {
            return syn::Error::new(option.span(), "Expected `running` or `strict`")
                .into_compile_error()
                .into();
        }
    }

    // Extract the injected arguments and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test keeps its own name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let policy = if strict {
        quote! { crate::relay::FailurePolicy::Strict }
    } else {
        quote! { crate::relay::FailurePolicy::Relay }
    };

    // Rewrite the test function.
    quote! {
        #[test]
        #[allow(unused_variables)]
        fn #name() {
            /// The test itself.
            #item_fn

            crate::testing::init_logging();

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("ledger-test")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                // Deploy and seed a fresh system.
                let ledger: crate::testing::TestLedger =
                    std::sync::Arc::new(crate::ledger::memory::MemoryLedger::new());
                let system = crate::testing::deploy(&ledger).await;
                let seeded = crate::testing::seed(&ledger, &system, #running).await;
                let rocket_client =
                    crate::testing::client_for(&system, seeded.keyring(), #policy).await;

                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, map parameters to the values to inject,
/// and reject unknown or repeated parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let injectable = [
        ("Client", quote! { rocket_client }),
        ("System", quote! { system }),
        ("TestLedger", quote! { ledger }),
        ("Seeded", quote! { seeded }),
    ];
    let mut seen = Vec::new();
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(type_ident) = type_path.path.get_ident() {
                    if let Some((type_name, value)) =
                        injectable.iter().find(|(type_name, _)| type_ident == type_name)
                    {
                        if seen.contains(type_name) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{type_name}`"),
                            ));
                        }
                        seen.push(*type_name);
                        args.push(value.clone());
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `Client`, `System`, `TestLedger` or `Seeded`",
        ));
    }

    Ok(args)
}
