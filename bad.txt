@@ 5-3 REPLACE
x
@@ END
=== END FILE ===