use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, FnArg, Ident, ItemFn, LitInt, Pat, PatType};

/// Default slow-call threshold in milliseconds.
const DEFAULT_THRESHOLD_MS: u64 = 1;
/// Default turn interval for unconditional reports.
const DEFAULT_EVERY: u64 = 100;

struct ProfileArgs {
    threshold_ms: u64,
    /// 0 disables turn-gated reports.
    every: u64,
}

impl Default for ProfileArgs {
    fn default() -> Self {
        Self {
            threshold_ms: DEFAULT_THRESHOLD_MS,
            every: DEFAULT_EVERY,
        }
    }
}

fn parse_args(attr: TokenStream2) -> syn::Result<ProfileArgs> {
    let mut args = ProfileArgs::default();
    if attr.is_empty() {
        return Ok(args);
    }
    // Bare threshold: `#[profile(4)]`
    if let Ok(lit) = syn::parse2::<LitInt>(attr.clone()) {
        args.threshold_ms = lit.base10_parse()?;
        return Ok(args);
    }
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("threshold_ms") {
            args.threshold_ms = meta.value()?.parse::<LitInt>()?.base10_parse()?;
            Ok(())
        } else if meta.path.is_ident("every") {
            args.every = meta.value()?.parse::<LitInt>()?.base10_parse()?;
            Ok(())
        } else {
            Err(meta.error("expected `threshold_ms = <ms>` or `every = <turns>`"))
        }
    });
    syn::parse::Parser::parse2(parser, attr)?;
    Ok(args)
}

/// Name of the first parameter whose type mentions `DecisionClock`, whatever it is called.
fn clock_param(item: &ItemFn) -> Option<Ident> {
    item.sig.inputs.iter().find_map(|arg| {
        let FnArg::Typed(PatType { pat, ty, .. }) = arg else {
            return None;
        };
        let Pat::Ident(pat_ident) = &**pat else {
            return None;
        };
        quote!(#ty)
            .to_string()
            .contains("DecisionClock")
            .then(|| pat_ident.ident.clone())
    })
}

fn guard(name: &str, args: &ProfileArgs, clock: Option<&Ident>) -> TokenStream2 {
    let threshold = u128::from(args.threshold_ms);
    let turn = match clock {
        Some(clock) => quote!(Some(#clock.turn)),
        None => quote!(None),
    };
    let due = match args.every {
        0 => quote!(false),
        every => quote!(turn % #every == 0),
    };

    quote! {
        struct ProfileGuard {
            name: &'static str,
            start: std::time::Instant,
            turn: Option<u64>,
        }
        impl Drop for ProfileGuard {
            fn drop(&mut self) {
                let elapsed = self.start.elapsed();
                let slow = elapsed.as_millis() > #threshold;
                match self.turn {
                    Some(turn) if slow || #due => {
                        bevy::prelude::info!("[PERF] {} (turn {}): {:?}", self.name, turn, elapsed);
                    }
                    None if slow => {
                        bevy::prelude::info!("[PERF] {}: {:?}", self.name, elapsed);
                    }
                    _ => {}
                }
            }
        }
        ProfileGuard {
            name: #name,
            start: std::time::Instant::now(),
            turn: #turn,
        }
    }
}

/// Time a decision system when the `perf_stats` feature is enabled.
///
/// The body runs under a drop guard that reports the elapsed time when it exceeds
/// the threshold. If a parameter's type mentions `DecisionClock`, the report also
/// carries the turn and is emitted unconditionally every `every` turns. Without
/// `perf_stats` the guard is compiled out.
///
/// # Arguments
/// - `#[profile]`: 1ms threshold, turn report every 100 turns
/// - `#[profile(4)]`: 4ms threshold
/// - `#[profile(threshold_ms = 4, every = 64)]`: both; `every = 0` turns the periodic report off
///
/// ```ignore
/// #[profile(threshold_ms = 4, every = 64)]
/// pub fn run_decision_cycle(
///     mut clock: ResMut<DecisionClock>,
///     cache: ResMut<CollectionCache>,
/// ) {
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let args = match parse_args(attr.into()) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };

    let clock = clock_param(&input);
    let guard = guard(&input.sig.ident.to_string(), &args, clock.as_ref());

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_timer = {
                #guard
            };

            #block
        }
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_args_accept_bare_threshold_and_named_pairs() {
        let args = parse_args(quote!()).unwrap();
        assert_eq!((args.threshold_ms, args.every), (DEFAULT_THRESHOLD_MS, DEFAULT_EVERY));

        let args = parse_args(quote!(4)).unwrap();
        assert_eq!((args.threshold_ms, args.every), (4, DEFAULT_EVERY));

        let args = parse_args(quote!(threshold_ms = 2, every = 0)).unwrap();
        assert_eq!((args.threshold_ms, args.every), (2, 0));

        assert!(parse_args(quote!(interval = 5)).is_err());
        assert!(parse_args(quote!(every = "often")).is_err());
    }

    #[test]
    fn test_clock_param_found_by_type() {
        let with_clock: ItemFn = parse_quote! {
            fn decide(config: Res<AiConfig>, mut ticks: ResMut<DecisionClock>) {}
        };
        assert_eq!(clock_param(&with_clock).map(|i| i.to_string()), Some("ticks".to_string()));

        let without: ItemFn = parse_quote! {
            fn ingest(clock: Res<Time>) {}
        };
        assert!(clock_param(&without).is_none());
    }

    #[test]
    fn test_disabled_interval_never_reports_by_turn() {
        let clock: Ident = parse_quote!(clock);
        let args = ProfileArgs {
            threshold_ms: 3,
            every: 0,
        };
        let code = guard("decide", &args, Some(&clock)).to_string();
        assert!(code.contains("slow || false"));
        assert!(code.contains("Some (clock . turn)"));

        let code = guard("decide", &ProfileArgs::default(), None).to_string();
        assert!(code.contains("turn % 100u64 == 0"));
        assert!(code.contains("turn : None"));
    }
}
