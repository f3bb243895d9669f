/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! `#[handle_error(InternalError)]`
//!
//! Wraps a public function returning `ApiResult<T>` so that its body is written against the
//! internal `Result<T, InternalError>`. The internal error is converted on the way out by
//! `error_support::convert_log_report_error`, which also performs the logging/reporting the
//! error's `GetErrorHandling` impl asks for.

use proc_macro::TokenStream;
use quote::quote;
use syn::{spanned::Spanned, GenericArgument, ItemFn, Path, PathArguments, ReturnType, Type};

const WRONG_RETURN_TYPE_MSG: &str = "Expected a Result<T> or Result<T, E>";

#[proc_macro_attribute]
pub fn handle_error(args: TokenStream, input: TokenStream) -> TokenStream {
    let internal_error = match syn::parse::<Path>(args) {
        Ok(path) => path,
        Err(e) => {
            return syn::Error::new(e.span(), "Expected #[handle_error(ErrorName)]")
                .to_compile_error()
                .into()
        }
    };
    let item = match syn::parse::<ItemFn>(input) {
        Ok(item) => item,
        Err(e) => {
            return syn::Error::new(e.span(), "The macro should only be used on functions")
                .to_compile_error()
                .into()
        }
    };
    TokenStream::from(match impl_handle_error(&item, &internal_error) {
        Ok(res) => res,
        Err(e) => e.to_compile_error(),
    })
}

fn impl_handle_error(item: &ItemFn, internal_error: &Path) -> syn::Result<proc_macro2::TokenStream> {
    let ok_type = result_ok_type(&item.sig.output)?;
    let attrs = &item.attrs;
    let vis = &item.vis;
    let sig = &item.sig;
    let body = &item.block;

    Ok(quote! {
        #(#attrs)*
        #vis #sig {
            (|| -> ::std::result::Result<#ok_type, #internal_error> {
                #body
            })()
            .map_err(::error_support::convert_log_report_error)
        }
    })
}

fn result_ok_type(output: &ReturnType) -> syn::Result<Type> {
    let ReturnType::Type(_, typ) = output else {
        return Err(syn::Error::new(output.span(), WRONG_RETURN_TYPE_MSG));
    };
    let Type::Path(type_path) = typ.as_ref() else {
        return Err(syn::Error::new(typ.span(), WRONG_RETURN_TYPE_MSG));
    };
    let seg = type_path
        .path
        .segments
        .last()
        .ok_or_else(|| syn::Error::new(type_path.span(), WRONG_RETURN_TYPE_MSG))?;
    let PathArguments::AngleBracketed(generic_args) = &seg.arguments else {
        return Err(syn::Error::new(seg.span(), WRONG_RETURN_TYPE_MSG));
    };
    match generic_args.args.first() {
        Some(GenericArgument::Type(t)) => Ok(t.clone()),
        Some(other) => Err(syn::Error::new(other.span(), WRONG_RETURN_TYPE_MSG)),
        None => Err(syn::Error::new(generic_args.span(), WRONG_RETURN_TYPE_MSG)),
    }
}
