mod support;

use futures::{StreamExt, stream};
use proptest::prelude::*;
use stepstream::prelude::*;
use stepstream::streaming::tee;
use stepstream::testing::{MockStep, text_events, tool_call_events};
use support::{get_item_id_tool, mock, options};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn total_usage_is_the_sum_of_step_usages(
        usages in proptest::collection::vec((0u64..10_000, 0u64..10_000), 1..5)
    ) {
        let last = usages.len() - 1;
        let script: Vec<MockStep> = usages
            .iter()
            .enumerate()
            .map(|(index, (input, output))| {
                let usage = Usage::new(*input, *output);
                if index == last {
                    MockStep::Events(text_events(&["done"], usage))
                } else {
                    let id = format!("call-{index}");
                    MockStep::Events(tool_call_events(&[(id.as_str(), "getItemId", "{}")], usage))
                }
            })
            .collect();
        let model = mock(script);
        let steps = usages.len();

        let (total, expected) = runtime().block_on(async move {
            let result = stream_text(
                options(&model)
                    .with_prompt("loop")
                    .with_tool("getItemId", get_item_id_tool())
                    .with_stop_when(step_count_is(steps)),
            )
            .unwrap();
            let recorded = result.steps().await.unwrap();
            let expected = Usage::sum(recorded.iter().map(|step| &step.usage));
            (result.total_usage().await.unwrap(), expected)
        });

        let input: u64 = usages.iter().map(|(input, _)| input).sum();
        let output: u64 = usages.iter().map(|(_, output)| output).sum();
        prop_assert_eq!(total, expected);
        prop_assert_eq!(total, Usage::new(input, output));
    }

    #[test]
    fn every_tee_branch_sees_the_whole_sequence(
        items in proptest::collection::vec(any::<u32>(), 0..64),
        branches in 1usize..5,
    ) {
        let expected = items.clone();
        let seen = runtime().block_on(async move {
            let origin = tee(stream::iter(items));
            let readers: Vec<_> = (0..branches).map(|_| origin.fork()).collect();
            drop(origin);
            futures::future::join_all(
                readers.into_iter().map(|reader| reader.collect::<Vec<u32>>()),
            )
            .await
        });
        for branch in seen {
            prop_assert_eq!(&branch, &expected);
        }
    }
}
